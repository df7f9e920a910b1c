use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use glance_editor_core::{EditorError, PushReport, RemoteSync, SyncSettings};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Request timeout applied to every call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sent with every request; the API rejects anonymous user agents.
pub const USER_AGENT: &str = "Glance-Config-Editor";

const ACCEPT: &str = "application/vnd.github.v3+json";

/// (repo, branch, path)
type PushTarget = (String, String, String);

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: Option<ContentsEntry>,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

/// What the revision lookup found for the target file.
#[derive(Debug, PartialEq, Eq)]
enum RemoteRevision {
    Existing(String),
    Absent,
    /// Lookup failed with this status; the push proceeds as a create
    Unknown(u16),
}

/// GitHub contents API client.
///
/// Each push fetches the current blob `sha` of the target file and sends it back
/// with the new content, so the API refuses the write if the file moved in between.
/// Pushes to the same (repo, branch, path) are serialized in-process.
pub struct GitHubSyncClient {
    http_client: HttpClient,
    api_base: Url,
    /// Per-target push locks
    push_locks: DashMap<PushTarget, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for GitHubSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSyncClient")
            .field("api_base", &self.api_base.as_str())
            .field("push_targets", &self.push_locks.len())
            .finish_non_exhaustive()
    }
}

impl GitHubSyncClient {
    /// Create a client for the API rooted at `api_base_url`.
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self, EditorError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                EditorError::RemoteTransportError(format!("Failed to build HTTP client: {}", e))
            })?;

        let api_base_url = api_base_url.into();
        let api_base = Url::parse(&api_base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                EditorError::RemoteTransportError(format!("Invalid API URL: {}", api_base_url))
            })?;

        Ok(Self {
            http_client,
            api_base,
            push_locks: DashMap::new(),
        })
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base.as_str().trim_end_matches('/')
    }

    /// Append `segments` to the API root, percent-encoding each one.
    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, EditorError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                EditorError::RemoteTransportError(format!("Invalid API URL: {}", self.api_base))
            })?
            .pop_if_empty()
            .extend(segments.into_iter().filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn repo_url(&self, settings: &SyncSettings) -> Result<Url, EditorError> {
        self.endpoint(std::iter::once("repos").chain(settings.repo.split('/')))
    }

    fn contents_url(&self, settings: &SyncSettings) -> Result<Url, EditorError> {
        self.endpoint(
            std::iter::once("repos")
                .chain(settings.repo.split('/'))
                .chain(std::iter::once("contents"))
                .chain(settings.path.split('/')),
        )
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", ACCEPT)
    }

    fn push_lock(&self, settings: &SyncSettings) -> Arc<Mutex<()>> {
        let key = (
            settings.repo.clone(),
            settings.branch.clone(),
            settings.path.clone(),
        );
        self.push_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Look up the current blob sha of the target file on the target branch.
    #[instrument(skip(self, settings), level = "debug", fields(repo = %settings.repo, path = %settings.path))]
    async fn fetch_revision(&self, settings: &SyncSettings) -> Result<RemoteRevision, EditorError> {
        let response = self
            .authorized(self.http_client.get(self.contents_url(settings)?), &settings.token)
            .query(&[("ref", settings.branch.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{} not found on {}, will create", settings.path, settings.branch);
            return Ok(RemoteRevision::Absent);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                "Revision lookup for {} failed with status {}: {}",
                settings.path,
                status,
                api_message(&text).unwrap_or_default()
            );
            return Ok(RemoteRevision::Unknown(status.as_u16()));
        }

        let entry: ContentsEntry = response.json().await.map_err(transport_error)?;
        debug!("Current revision of {}: {}", settings.path, entry.sha);
        Ok(RemoteRevision::Existing(entry.sha))
    }
}

#[async_trait]
impl RemoteSync for GitHubSyncClient {
    fn backend_name(&self) -> &'static str {
        "github"
    }

    #[instrument(skip(self, text, settings), level = "debug", fields(text_len = text.len(), repo = %settings.repo))]
    async fn push(&self, text: &str, settings: &SyncSettings) -> Result<PushReport, EditorError> {
        if let Some(field) = settings.missing_field() {
            return Err(EditorError::SettingsIncomplete(field.to_string()));
        }

        let lock = self.push_lock(settings);
        let _guard = lock.lock().await;

        let (sha, create_assumed) = match self.fetch_revision(settings).await? {
            RemoteRevision::Existing(sha) => (Some(sha), None),
            RemoteRevision::Absent => (None, None),
            RemoteRevision::Unknown(status) => (None, Some(status)),
        };

        let body = PutContentsRequest {
            message: settings.commit_message(),
            content: STANDARD.encode(text.as_bytes()),
            branch: &settings.branch,
            sha,
        };

        let response = self
            .authorized(self.http_client.put(self.contents_url(settings)?), &settings.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let created = match status {
            StatusCode::CREATED => true,
            StatusCode::OK => false,
            _ => return Err(push_error(status, response).await),
        };

        // The new sha is informational; an unexpected body does not undo the push
        let revision = response
            .json::<PutContentsResponse>()
            .await
            .ok()
            .and_then(|r| r.content)
            .map(|c| c.sha);

        info!(
            "{} {} on {}@{}",
            if created { "Created" } else { "Updated" },
            settings.path,
            settings.repo,
            settings.branch
        );
        Ok(PushReport {
            created,
            create_assumed,
            revision,
        })
    }

    #[instrument(skip(self, settings), level = "debug", fields(repo = %settings.repo))]
    async fn test_connection(&self, settings: &SyncSettings) -> Result<String, EditorError> {
        for (field, value) in [("token", &settings.token), ("repo", &settings.repo)] {
            if value.trim().is_empty() {
                return Err(EditorError::SettingsIncomplete(field.to_string()));
            }
        }

        let response = self
            .authorized(self.http_client.get(self.repo_url(settings)?), &settings.token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let info: RepositoryInfo = response.json().await.map_err(transport_error)?;
                info!("Connected to {}", info.full_name);
                Ok(info.full_name)
            }
            StatusCode::NOT_FOUND => Err(EditorError::RemoteNotFound(
                "Repository not found or no access".to_string(),
            )),
            StatusCode::UNAUTHORIZED => Err(EditorError::RemoteAuthFailed(
                "Invalid GitHub token".to_string(),
            )),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(EditorError::RemoteRejected(
                    api_message(&text).unwrap_or_else(|| fallback_message(status)),
                ))
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> EditorError {
    EditorError::RemoteTransportError(e.to_string())
}

/// The `message` field of an API error body, if there is one.
fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiMessage>(body)
        .ok()
        .and_then(|m| m.message)
        .filter(|m| !m.is_empty())
}

fn fallback_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown error".to_string())
}

async fn push_error(status: StatusCode, response: Response) -> EditorError {
    let text = response.text().await.unwrap_or_default();
    let message = api_message(&text).unwrap_or_else(|| fallback_message(status));
    warn!("Push rejected with status {}: {}", status, message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EditorError::RemoteAuthFailed(message),
        StatusCode::NOT_FOUND => EditorError::RemoteNotFound(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            EditorError::RemoteConflict(message)
        }
        _ => EditorError::RemoteRejected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTENTS_PATH: &str = "/repos/a/b/contents/x.yaml";

    fn settings() -> SyncSettings {
        SyncSettings {
            enabled: true,
            token: "secret123".to_string(),
            repo: "a/b".to_string(),
            branch: "main".to_string(),
            path: "x.yaml".to_string(),
            commit_message: None,
        }
    }

    fn client(server: &MockServer) -> GitHubSyncClient {
        GitHubSyncClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    async fn put_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "PUT")
            .map(|r| r.body_json::<Value>().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_push_creates_absent_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .and(query_param("ref", "main"))
            .and(header("Authorization", "Bearer secret123"))
            .and(header("Accept", ACCEPT))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"content": {"sha": "new1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let report = client(&server).push("a: 1\n", &settings()).await.unwrap();
        assert!(report.created);
        assert_eq!(report.create_assumed, None);
        assert_eq!(report.revision.as_deref(), Some("new1"));

        let bodies = put_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["content"], STANDARD.encode("a: 1\n"));
        assert_eq!(bodies[0]["branch"], "main");
        assert_eq!(bodies[0]["message"], "Update glance configuration");
        assert!(bodies[0].get("sha").is_none());
    }

    #[tokio::test]
    async fn test_push_updates_with_current_sha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "abc123"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .and(body_partial_json(json!({"sha": "abc123"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "def456"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut target = settings();
        target.commit_message = Some("Tweak widgets".to_string());

        let report = client(&server).push("a: 2\n", &target).await.unwrap();
        assert!(!report.created);
        assert_eq!(report.revision.as_deref(), Some("def456"));

        let bodies = put_bodies(&server).await;
        assert_eq!(bodies[0]["message"], "Tweak widgets");
    }

    #[tokio::test]
    async fn test_push_conflict() {
        for status in [409u16, 422] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(CONTENTS_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "stale"})))
                .mount(&server)
                .await;
            Mock::given(method("PUT"))
                .and(path(CONTENTS_PATH))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(json!({"message": "x.yaml does not match stale"})),
                )
                .mount(&server)
                .await;

            let result = client(&server).push("a: 3\n", &settings()).await;
            assert_eq!(
                result,
                Err(EditorError::RemoteConflict(
                    "x.yaml does not match stale".to_string()
                ))
            );
        }
    }

    #[tokio::test]
    async fn test_push_status_mapping() {
        let cases = [
            (401u16, "auth"),
            (403, "auth"),
            (404, "not_found"),
            (500, "rejected"),
        ];
        for (status, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(CONTENTS_PATH))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            Mock::given(method("PUT"))
                .and(path(CONTENTS_PATH))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "nope"})))
                .mount(&server)
                .await;

            let err = client(&server)
                .push("a: 4\n", &settings())
                .await
                .unwrap_err();
            match kind {
                "auth" => assert_eq!(err, EditorError::RemoteAuthFailed("nope".to_string())),
                "not_found" => assert_eq!(err, EditorError::RemoteNotFound("nope".to_string())),
                _ => assert_eq!(err, EditorError::RemoteRejected("nope".to_string())),
            }
            assert!(err.is_remote());
        }
    }

    #[tokio::test]
    async fn test_push_without_api_message_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .push("a: 5\n", &settings())
            .await
            .unwrap_err();
        assert_eq!(err, EditorError::RemoteRejected("Bad Gateway".to_string()));
    }

    #[tokio::test]
    async fn test_failed_lookup_proceeds_as_create() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let report = client(&server).push("a: 6\n", &settings()).await.unwrap();
        assert!(report.created);
        assert_eq!(report.create_assumed, Some(500));
        assert_eq!(report.revision, None);

        let bodies = put_bodies(&server).await;
        assert!(bodies[0].get("sha").is_none());
    }

    #[tokio::test]
    async fn test_push_requires_complete_settings() {
        let server = MockServer::start().await;
        let mut target = settings();
        target.branch.clear();

        let result = client(&server).push("a: 7\n", &target).await;
        assert_eq!(
            result,
            Err(EditorError::SettingsIncomplete("branch".to_string()))
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on the discard port
        let client = GitHubSyncClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

        let result = client.push("a: 8\n", &settings()).await;
        assert!(matches!(result, Err(EditorError::RemoteTransportError(_))));

        let result = client.test_connection(&settings()).await;
        assert!(matches!(result, Err(EditorError::RemoteTransportError(_))));
    }

    #[tokio::test]
    async fn test_connection_reports_full_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b"))
            .and(header("Authorization", "Bearer secret123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"full_name": "a/b"})))
            .mount(&server)
            .await;

        let full_name = client(&server).test_connection(&settings()).await.unwrap();
        assert_eq!(full_name, "a/b");
    }

    #[tokio::test]
    async fn test_connection_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/a/limited"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"message": "API rate limit exceeded"})),
            )
            .mount(&server)
            .await;
        let client = client(&server);

        let mut target = settings();
        target.repo = "a/missing".to_string();
        assert_eq!(
            client.test_connection(&target).await,
            Err(EditorError::RemoteNotFound(
                "Repository not found or no access".to_string()
            ))
        );

        assert_eq!(
            client.test_connection(&settings()).await,
            Err(EditorError::RemoteAuthFailed(
                "Invalid GitHub token".to_string()
            ))
        );

        target.repo = "a/limited".to_string();
        assert_eq!(
            client.test_connection(&target).await,
            Err(EditorError::RemoteRejected(
                "API rate limit exceeded".to_string()
            ))
        );
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let client = GitHubSyncClient::new("https://ghe.example.com/api/v3/", DEFAULT_TIMEOUT)
            .unwrap();
        assert_eq!(client.api_base_url(), "https://ghe.example.com/api/v3");
        assert_eq!(
            client.contents_url(&settings()).unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/a/b/contents/x.yaml"
        );
        assert_eq!(
            client.repo_url(&settings()).unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/a/b"
        );
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let client = GitHubSyncClient::new(DEFAULT_API_URL, DEFAULT_TIMEOUT).unwrap();
        let mut target = settings();
        target.path = "/dashboards/home #1?.yaml".to_string();

        let url = client.contents_url(&target).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/a/b/contents/dashboards/home%20%231%3F.yaml"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = GitHubSyncClient::new("not a url", DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(EditorError::RemoteTransportError(_))));
    }

    #[tokio::test]
    async fn test_encoded_path_reaches_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b/contents/notes%231.yaml"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/a/b/contents/notes%231.yaml"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut target = settings();
        target.path = "notes#1.yaml".to_string();
        let report = client(&server).push("a: 1\n", &target).await.unwrap();
        assert!(report.created);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_to_one_target_are_serialized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(
                ResponseTemplate::new(201).set_delay(Duration::from_millis(50)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = Arc::new(client(&server));
        let mut handles = vec![];
        for i in 0..3 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.push(&format!("a: {}\n", i), &settings()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(client.push_locks.len(), 1);

        // Each revision lookup happens only after the previous write completed
        let methods: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.method.to_string())
            .collect();
        assert_eq!(methods, vec!["GET", "PUT", "GET", "PUT", "GET", "PUT"]);
    }
}
