//! GitHub REST v3 client implementing [`IssueTracker`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use reconcile::ports::IssueTracker;
use reconcile::{LabelName, LabelSet, RepoRef, Subject, TrackerError};

use crate::ClientError;

/// Public GitHub API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT_VALUE: &str = "labelsmith";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
// Stops a runaway pagination loop; 100 pages is 10k labels.
const MAX_PAGES: usize = 100;
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct LabelBody {
    name: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsBody<'a> {
    labels: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// A GitHub REST client authenticated with a single token.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct RestTracker {
    http: reqwest::Client,
    base: Url,
}

impl RestTracker {
    /// Builds a client for `base_url` (e.g. [`DEFAULT_API_BASE_URL`] or a
    /// GitHub Enterprise `https://host/api/v3`).
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url.trim()).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: "URL cannot carry a path".into(),
            });
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(ClientError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self { http, base })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so this always yields segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn issue_endpoint(&self, subject: &Subject, tail: &[&str]) -> Url {
        let number = subject.number.to_string();
        let mut segments = vec![
            "repos",
            subject.repo.owner.as_str(),
            subject.repo.name.as_str(),
            "issues",
            number.as_str(),
        ];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TrackerError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::Status {
            status: status.as_u16(),
            message: truncate(&body, MAX_ERROR_BODY),
        })
    }

    /// Fetches every page of a label listing.
    async fn list_labels(&self, url: Url) -> Result<LabelSet, TrackerError> {
        let mut labels = LabelSet::new();
        for page in 1..=MAX_PAGES {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let response = self.send(self.http.get(page_url)).await?;
            let rows: Vec<LabelBody> = response.json().await.map_err(|e| {
                TrackerError::InvalidResponse {
                    message: e.to_string(),
                }
            })?;
            let count = rows.len();
            labels.extend(rows.into_iter().filter_map(|l| LabelName::new(l.name)));
            if count < PER_PAGE {
                break;
            }
        }
        Ok(labels)
    }
}

fn transport(e: reqwest::Error) -> TrackerError {
    TrackerError::Transport {
        message: e.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

#[async_trait]
impl IssueTracker for RestTracker {
    async fn add_label(&self, subject: &Subject, label: &LabelName) -> Result<(), TrackerError> {
        let url = self.issue_endpoint(subject, &["labels"]);
        let body = AddLabelsBody {
            labels: [label.as_str()],
        };
        self.send(self.http.post(url).json(&body)).await?;
        debug!(subject = %subject, label = %label, "Added label");
        Ok(())
    }

    async fn remove_label(
        &self,
        subject: &Subject,
        label: &LabelName,
    ) -> Result<(), TrackerError> {
        let url = self.issue_endpoint(subject, &["labels", label.as_str()]);
        match self.send(self.http.request(Method::DELETE, url)).await {
            Ok(_) => {
                debug!(subject = %subject, label = %label, "Removed label");
                Ok(())
            }
            Err(TrackerError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!(subject = %subject, label = %label, "Label was not present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn issue_labels(&self, subject: &Subject) -> Result<LabelSet, TrackerError> {
        self.list_labels(self.issue_endpoint(subject, &["labels"]))
            .await
    }

    async fn repo_labels(&self, repo: &RepoRef) -> Result<LabelSet, TrackerError> {
        let url = self.endpoint(&["repos", repo.owner.as_str(), repo.name.as_str(), "labels"]);
        self.list_labels(url).await
    }

    async fn create_comment(&self, subject: &Subject, body: &str) -> Result<(), TrackerError> {
        let url = self.issue_endpoint(subject, &["comments"]);
        self.send(self.http.post(url).json(&CommentBody { body }))
            .await?;
        debug!(subject = %subject, "Created comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use reconcile::SubjectNumber;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn tracker(base: &str) -> RestTracker {
        RestTracker::new(base, "secret-token", DEFAULT_TIMEOUT).unwrap()
    }

    fn subject() -> Subject {
        Subject::new(
            RepoRef::from_full_name("org/repo").unwrap(),
            SubjectNumber::new(12).unwrap(),
        )
    }

    // -----------------------------------------------------------------------
    // URL building
    // -----------------------------------------------------------------------

    #[test]
    fn label_names_are_percent_encoded() {
        let t = tracker("https://api.github.com");
        let url = t.issue_endpoint(&subject(), &["labels", "area/api needs work"]);
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/org/repo/issues/12/labels/area%2Fapi%20needs%20work"
        );
    }

    #[test]
    fn enterprise_base_path_is_kept() {
        let t = tracker("https://ghe.example.com/api/v3/");
        let url = t.endpoint(&["repos", "org", "repo", "labels"]);
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/org/repo/labels"
        );
    }

    #[test]
    fn construction_rejects_bad_input() {
        assert!(matches!(
            RestTracker::new("not a url", "t", DEFAULT_TIMEOUT),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            RestTracker::new("mailto:someone@example.com", "t", DEFAULT_TIMEOUT),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            RestTracker::new(DEFAULT_API_BASE_URL, "  ", DEFAULT_TIMEOUT),
            Err(ClientError::MissingToken)
        ));
        assert!(matches!(
            RestTracker::new(DEFAULT_API_BASE_URL, "bad\ntoken", DEFAULT_TIMEOUT),
            Err(ClientError::InvalidToken)
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    // -----------------------------------------------------------------------
    // Against a local stand-in server
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct Recorded {
        requests: Vec<(String, String, Option<Value>)>,
        authorization: Vec<String>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn repo_labels(
        State(rec): State<Shared>,
        headers: axum::http::HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let mut rec = rec.lock().unwrap();
        if let Some(auth) = headers.get("authorization") {
            rec.authorization
                .push(auth.to_str().unwrap_or_default().to_owned());
        }
        let page: usize = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        rec.requests
            .push(("GET".into(), format!("labels?page={page}"), None));
        let labels: Vec<Value> = match page {
            1 => (0..PER_PAGE).map(|i| json!({ "name": format!("l{i}") })).collect(),
            _ => vec![json!({ "name": "last" })],
        };
        Json(Value::Array(labels))
    }

    async fn add_labels(
        State(rec): State<Shared>,
        Path((_, _, number)): Path<(String, String, u64)>,
        Json(body): Json<Value>,
    ) -> AxumStatus {
        rec.lock()
            .unwrap()
            .requests
            .push(("POST".into(), format!("{number}/labels"), Some(body)));
        AxumStatus::OK
    }

    async fn remove_label(Path((_, _, _, label)): Path<(String, String, u64, String)>) -> AxumStatus {
        if label == "absent" {
            AxumStatus::NOT_FOUND
        } else if label == "locked" {
            AxumStatus::FORBIDDEN
        } else {
            AxumStatus::OK
        }
    }

    async fn create_comment(State(rec): State<Shared>, Json(body): Json<Value>) -> AxumStatus {
        rec.lock()
            .unwrap()
            .requests
            .push(("POST".into(), "comments".into(), Some(body)));
        AxumStatus::CREATED
    }

    async fn serve() -> (String, Shared) {
        let rec: Shared = Arc::default();
        let app = Router::new()
            .route("/repos/{owner}/{repo}/labels", get(repo_labels))
            .route("/repos/{owner}/{repo}/issues/{number}/labels", post(add_labels))
            .route(
                "/repos/{owner}/{repo}/issues/{number}/labels/{label}",
                delete(remove_label),
            )
            .route(
                "/repos/{owner}/{repo}/issues/{number}/comments",
                post(create_comment),
            )
            .with_state(rec.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rec)
    }

    #[tokio::test]
    async fn repo_labels_follow_pagination() {
        let (base, rec) = serve().await;
        let labels = tracker(&base)
            .repo_labels(&subject().repo)
            .await
            .unwrap();

        assert_eq!(labels.len(), PER_PAGE + 1);
        assert!(labels.contains_name("last"));
        let rec = rec.lock().unwrap();
        assert_eq!(rec.requests.len(), 2);
        assert_eq!(rec.authorization[0], "Bearer secret-token");
    }

    #[tokio::test]
    async fn add_label_posts_single_label() {
        let (base, rec) = serve().await;
        tracker(&base)
            .add_label(&subject(), &LabelName::new("lgtm").unwrap())
            .await
            .unwrap();

        let rec = rec.lock().unwrap();
        assert_eq!(
            rec.requests[0],
            (
                "POST".to_string(),
                "12/labels".to_string(),
                Some(json!({ "labels": ["lgtm"] }))
            )
        );
    }

    #[tokio::test]
    async fn removing_absent_label_succeeds() {
        let (base, _) = serve().await;
        let t = tracker(&base);

        t.remove_label(&subject(), &LabelName::new("absent").unwrap())
            .await
            .unwrap();
        let err = t
            .remove_label(&subject(), &LabelName::new("locked").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn comment_body_is_sent() {
        let (base, rec) = serve().await;
        tracker(&base)
            .create_comment(&subject(), "please sign")
            .await
            .unwrap();

        let rec = rec.lock().unwrap();
        assert_eq!(rec.requests[0].2, Some(json!({ "body": "please sign" })));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let t = RestTracker::new("http://127.0.0.1:1", "t", Duration::from_secs(2)).unwrap();
        let err = t.issue_labels(&subject()).await.unwrap_err();
        assert!(matches!(err, TrackerError::Transport { .. }));
    }
}
