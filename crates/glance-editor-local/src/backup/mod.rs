mod local;

pub use local::LocalBackupStore;
