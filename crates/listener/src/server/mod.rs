//! HTTP server for webhook ingress.
//!
//! # Endpoints
//!
//! - `POST /hook` - Accepts GitHub webhook deliveries (returns 200 unless the
//!   signature is invalid)
//! - `GET /` and `GET /health` - Return 200 while the server is running

use std::future::Future;
use std::sync::Arc;

use reconcile::ports::IssueTracker;
use reconcile::{ArchivalSink, Router, SettingsHandle};
use tokio::net::TcpListener;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{
    accept_delivery, inbound_delivery, webhook_handler, DeliveryTasks, WebhookError,
};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Webhook secret for HMAC signature verification.
    webhook_secret: Vec<u8>,
    /// Handler table, built once at startup.
    router: Arc<Router>,
    github: Arc<dyn IssueTracker>,
    /// Swapped by the configuration reloader.
    settings: Arc<SettingsHandle>,
    sink: ArchivalSink,
}

impl AppState {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        router: Arc<Router>,
        github: Arc<dyn IssueTracker>,
        settings: Arc<SettingsHandle>,
        sink: ArchivalSink,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret: webhook_secret.into(),
                router,
                github,
                settings,
                sink,
            }),
        }
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.inner.router
    }

    pub fn github(&self) -> &Arc<dyn IssueTracker> {
        &self.inner.github
    }

    pub fn settings(&self) -> &Arc<SettingsHandle> {
        &self.inner.settings
    }

    pub fn sink(&self) -> &ArchivalSink {
        &self.inner.sink
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/hook", post(webhook_handler))
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Serves `app_state` on `listener` until `shutdown` resolves.
///
/// Requests already in progress are allowed to finish. Background delivery
/// tasks are not awaited.
pub async fn serve<F>(
    listener: TcpListener,
    app_state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::testing::{FakeTracker, MemoryArchiveStore};
    use reconcile::RouterBuilder;

    fn state() -> AppState {
        AppState::new(
            b"test-secret".to_vec(),
            Arc::new(RouterBuilder::new().build()),
            Arc::new(FakeTracker::new()),
            Arc::new(SettingsHandle::default()),
            ArchivalSink::new(Arc::new(MemoryArchiveStore::new())),
        )
    }

    #[test]
    fn app_state_accessors_work() {
        let state = state();
        assert_eq!(state.webhook_secret(), b"test-secret");
        assert_eq!(state.settings().snapshot().archive.bucket, "");
    }

    #[test]
    fn app_state_is_clone() {
        let state = state();
        let cloned = state.clone();
        assert!(Arc::ptr_eq(state.router(), cloned.router()));
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use reconcile::testing::{FakeTracker, MemoryArchiveStore};
    use reconcile::{
        content_digest, ArchiveSettings, DecodedEvent, EventHandler, EventKind, HandlerContext,
        HandlerError, RouterBuilder, Settings,
    };

    use crate::signature::{
        compute_signature, format_signature_header, InboundDelivery, SignatureAlgorithm,
    };

    const SECRET: &[u8] = b"test-secret";

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<DecodedEvent>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<DecodedEvent> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(
            &self,
            event: &DecodedEvent,
            _ctx: &HandlerContext,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Harness {
        state: AppState,
        recorder: Arc<Recorder>,
        store: Arc<MemoryArchiveStore>,
    }

    fn harness_with(settings: Settings) -> Harness {
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(MemoryArchiveStore::new());
        let router = RouterBuilder::new()
            .on(EventKind::PullRequest, recorder.clone())
            .on(EventKind::IssueComment, recorder.clone())
            .build();
        let state = AppState::new(
            SECRET.to_vec(),
            Arc::new(router),
            Arc::new(FakeTracker::new()),
            Arc::new(SettingsHandle::new(settings)),
            ArchivalSink::new(store.clone()),
        );
        Harness {
            state,
            recorder,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(Settings {
            archive: ArchiveSettings {
                bucket: "audit".into(),
                prefix: String::new(),
            },
            ..Settings::default()
        })
    }

    fn pull_request(number: i64) -> serde_json::Value {
        json!({
            "action": "opened",
            "number": number,
            "pull_request": { "number": number, "user": { "login": "alice" } },
            "repository": {
                "full_name": "org/repo",
                "name": "repo",
                "owner": { "login": "org" }
            },
            "sender": { "login": "alice" }
        })
    }

    fn sign(body: &[u8], algorithm: SignatureAlgorithm) -> String {
        format_signature_header(algorithm, &compute_signature(algorithm, body, SECRET).unwrap())
    }

    fn signed(delivery_id: &str, body: &serde_json::Value) -> InboundDelivery {
        let payload = Bytes::from(serde_json::to_vec(body).unwrap());
        InboundDelivery {
            signature_header: sign(&payload, SignatureAlgorithm::Sha256),
            delivery_id: delivery_id.to_owned(),
            payload,
        }
    }

    /// Creates a webhook request signed with `SECRET`.
    fn create_webhook_request(
        event_type: &str,
        delivery_id: &str,
        body: &serde_json::Value,
    ) -> Request<Body> {
        let body_bytes = serde_json::to_vec(body).unwrap();
        Request::builder()
            .method("POST")
            .uri("/hook")
            .header("content-type", "application/json")
            .header("x-github-event", event_type)
            .header("x-github-delivery", delivery_id)
            .header(
                "x-hub-signature-256",
                sign(&body_bytes, SignatureAlgorithm::Sha256),
            )
            .body(Body::from(body_bytes))
            .unwrap()
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    // ─── Health endpoint tests ───

    #[tokio::test]
    async fn health_returns_200() {
        for uri in ["/", "/health"] {
            let app = build_router(harness().state);
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

            let response = app.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"OK");
        }
    }

    // ─── Signature tests ───

    #[tokio::test]
    async fn webhook_without_signature_returns_401() {
        let h = harness();
        let app = build_router(h.state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/hook")
            .header("x-github-event", "pull_request")
            .body(Body::from(serde_json::to_vec(&pull_request(42)).unwrap()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.recorder.seen().is_empty());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn webhook_with_wrong_secret_returns_401() {
        let h = harness();
        let app = build_router(h.state.clone());
        let body = serde_json::to_vec(&pull_request(42)).unwrap();
        let signature = compute_signature(SignatureAlgorithm::Sha256, &body, b"wrong").unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/hook")
            .header("x-github-event", "pull_request")
            .header(
                "x-hub-signature-256",
                format_signature_header(SignatureAlgorithm::Sha256, &signature),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejected_delivery_starts_no_work() {
        let h = harness();
        let mut delivery = signed("d-1", &pull_request(42));
        delivery.payload = Bytes::from_static(b"{\"tampered\":true}");

        let result = accept_delivery(&h.state, "pull_request", delivery);

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[tokio::test]
    async fn sha1_signature_is_accepted() {
        let h = harness();
        let payload = Bytes::from(serde_json::to_vec(&pull_request(7)).unwrap());
        let delivery = InboundDelivery {
            signature_header: sign(&payload, SignatureAlgorithm::Sha1),
            delivery_id: "d-sha1".into(),
            payload,
        };

        let tasks = accept_delivery(&h.state, "pull_request", delivery).unwrap();
        tasks.join().await;

        assert_eq!(h.recorder.seen().len(), 1);
    }

    // ─── Delivery tests ───

    #[tokio::test]
    async fn valid_webhook_returns_200_and_dispatches() {
        let h = harness();
        let app = build_router(h.state.clone());

        let response = app
            .oneshot(create_webhook_request("pull_request", "d-1", &pull_request(42)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let recorder = h.recorder.clone();
        eventually(move || recorder.seen().len() == 1).await;
        let store = h.store.clone();
        eventually(move || store.keys().len() == 1).await;
    }

    #[tokio::test]
    async fn accepted_delivery_is_archived_and_routed() {
        let h = harness();
        let delivery = signed("d-42", &pull_request(42));
        let payload = delivery.payload.clone();

        let tasks = accept_delivery(&h.state, "pull_request", delivery).unwrap();
        assert!(tasks.archive.is_some());
        assert!(tasks.dispatch.is_some());
        tasks.join().await;

        let seen = h.recorder.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].subject().to_string(), "org/repo#42");

        let keys = h.store.keys();
        assert_eq!(keys.len(), 1);
        let (bucket, path) = &keys[0];
        assert_eq!(bucket, "audit");
        assert!(path.starts_with("hatch-webhooks/org/repo/42/"), "{path}");
        assert!(path.ends_with("/d-42"), "{path}");
        assert_eq!(h.store.get(bucket, path).unwrap(), payload.to_vec());
    }

    #[tokio::test]
    async fn redelivery_is_archived_once() {
        let h = harness();
        for _ in 0..2 {
            accept_delivery(
                &h.state,
                "pull_request",
                signed("d-same", &pull_request(42)),
            )
            .unwrap()
            .join()
            .await;
        }

        assert_eq!(h.store.writes(), 2);
        assert_eq!(h.store.keys().len(), 1);
    }

    #[tokio::test]
    async fn missing_delivery_id_archives_under_digest() {
        let h = harness();
        let delivery = signed("", &pull_request(42));
        let digest = content_digest(&delivery.payload);

        accept_delivery(&h.state, "pull_request", delivery)
            .unwrap()
            .join()
            .await;

        let keys = h.store.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].1.ends_with(&digest), "{}", keys[0].1);
        assert_eq!(h.recorder.seen().len(), 1);
    }

    #[tokio::test]
    async fn zero_subject_number_is_ignored() {
        let h = harness();
        let app = build_router(h.state.clone());

        let response = app
            .oneshot(create_webhook_request("pull_request", "d-0", &pull_request(0)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tasks = accept_delivery(
            &h.state,
            "pull_request",
            signed("d-0", &pull_request(0)),
        )
        .unwrap();
        assert!(tasks.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.recorder.seen().is_empty());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn undecodable_routed_event_is_not_archived() {
        let h = harness();
        let app = build_router(h.state.clone());
        let mut body = pull_request(5);
        body.as_object_mut().unwrap().remove("action");
        body["sender"] = json!("not-an-object");

        let response = app
            .oneshot(create_webhook_request("pull_request", "d-5", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tasks = accept_delivery(&h.state, "pull_request", signed("d-5", &body)).unwrap();
        assert!(tasks.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.recorder.seen().is_empty());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn malformed_payload_returns_200_without_work() {
        let h = harness();
        let app = build_router(h.state.clone());
        let body = b"not json".to_vec();
        let request = Request::builder()
            .method("POST")
            .uri("/hook")
            .header("x-github-event", "pull_request")
            .header("x-hub-signature-256", sign(&body, SignatureAlgorithm::Sha256))
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.recorder.seen().is_empty());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn unrouted_kind_with_pull_request_is_archived_only() {
        let h = harness();
        let mut body = pull_request(9);
        body["action"] = json!("submitted");
        body["review"] = json!({ "state": "approved" });

        let tasks = accept_delivery(
            &h.state,
            "pull_request_review",
            signed("d-r", &body),
        )
        .unwrap();

        assert!(tasks.archive.is_some());
        assert!(tasks.dispatch.is_none());
        tasks.join().await;
        assert_eq!(h.store.keys().len(), 1);
        assert!(h.recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn missing_bucket_still_dispatches() {
        let h = harness_with(Settings::default());

        accept_delivery(
            &h.state,
            "pull_request",
            signed("d-1", &pull_request(42)),
        )
        .unwrap()
        .join()
        .await;

        assert_eq!(h.store.writes(), 0);
        assert_eq!(h.recorder.seen().len(), 1);
    }

    #[tokio::test]
    async fn archive_failure_does_not_block_dispatch() {
        let h = harness();
        h.store.fail_writes();

        accept_delivery(
            &h.state,
            "pull_request",
            signed("d-1", &pull_request(42)),
        )
        .unwrap()
        .join()
        .await;

        assert!(h.store.keys().is_empty());
        assert_eq!(h.recorder.seen().len(), 1);
    }

    #[tokio::test]
    async fn reloaded_settings_apply_to_next_delivery() {
        let h = harness();
        h.state.settings().replace(Settings {
            archive: ArchiveSettings {
                bucket: "replay".into(),
                prefix: "custom".into(),
            },
            ..Settings::default()
        });

        accept_delivery(
            &h.state,
            "pull_request",
            signed("d-1", &pull_request(42)),
        )
        .unwrap()
        .join()
        .await;

        let keys = h.store.keys();
        assert_eq!(keys[0].0, "replay");
        assert!(keys[0].1.starts_with("custom/org/repo/42/"));
    }
}
