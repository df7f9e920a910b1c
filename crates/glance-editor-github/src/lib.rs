mod client;

pub use client::{GitHubSyncClient, DEFAULT_API_URL, DEFAULT_TIMEOUT, USER_AGENT};
