//! Webhook endpoint handler.
//!
//! Verifies the delivery signature, then starts two independent background
//! tasks: archival of the raw payload and dispatch of the decoded event to
//! the router. A routed kind that fails to decode starts neither. Both run detached from the request, so the sender gets its
//! response as soon as the signature has been checked and a client
//! disconnect never cancels accepted work.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use reconcile::{decode, decode_archive_subject, ArchiveError, EventKind, HandlerContext};

use super::AppState;
use crate::signature::{verify_delivery, InboundDelivery};

/// Header name for GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for the HMAC-SHA1 signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature";
/// Header name for the HMAC-SHA256 signature.
pub const HEADER_SIGNATURE_256: &str = "x-hub-signature-256";

/// Errors that end a webhook request early.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
        }
    }
}

/// Background work started for one accepted delivery.
///
/// Either task is `None` when the delivery did not qualify for it.
#[derive(Debug, Default)]
pub struct DeliveryTasks {
    pub archive: Option<JoinHandle<()>>,
    pub dispatch: Option<JoinHandle<()>>,
}

impl DeliveryTasks {
    pub fn is_empty(&self) -> bool {
        self.archive.is_none() && self.dispatch.is_none()
    }

    /// Waits for both tasks to finish.
    pub async fn join(self) {
        for task in [self.archive, self.dispatch].into_iter().flatten() {
            if let Err(e) = task.await {
                error!(error = %e, "Delivery task panicked");
            }
        }
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-GitHub-Event`: event type (e.g. "pull_request", "issue_comment")
///   - `X-GitHub-Delivery`: delivery ID, optional
///   - `X-Hub-Signature-256` or `X-Hub-Signature`: HMAC of the body
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: delivery accepted, or ignored because it is malformed or of no
///   interest
/// - 401 Unauthorized: missing or invalid signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = header_value(&headers, HEADER_EVENT);
    accept_delivery(&app_state, &event_type, inbound_delivery(&headers, body))?;
    Ok((StatusCode::OK, ""))
}

/// Builds the verifier input from request headers.
///
/// `X-Hub-Signature-256` wins over `X-Hub-Signature` when both are sent.
pub fn inbound_delivery(headers: &HeaderMap, body: Bytes) -> InboundDelivery {
    let signature_header = headers
        .get(HEADER_SIGNATURE_256)
        .or_else(|| headers.get(HEADER_SIGNATURE))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    InboundDelivery {
        payload: body,
        signature_header,
        delivery_id: header_value(headers, HEADER_DELIVERY),
    }
}

/// Verifies a delivery and starts its archival and dispatch tasks.
///
/// Must be called from within a Tokio runtime.
pub fn accept_delivery(
    app_state: &AppState,
    event_type: &str,
    delivery: InboundDelivery,
) -> Result<DeliveryTasks, WebhookError> {
    let verification = verify_delivery(delivery, app_state.webhook_secret());
    let delivery_id = verification.delivery_id;
    if !verification.valid {
        warn!(delivery_id = %delivery_id, event_type, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }
    if delivery_id.is_empty() {
        debug!(event_type, "Delivery has no delivery id");
    }

    let payload = verification.payload;
    let settings = app_state.settings().snapshot();
    let mut tasks = DeliveryTasks::default();

    let routed = EventKind::from_header(event_type).is_some();
    let event = match decode(event_type, &payload) {
        Ok(event) => event,
        Err(e) => {
            info!(
                delivery_id = %delivery_id,
                event_type,
                error = %e,
                "Ignoring malformed event"
            );
            return Ok(tasks);
        }
    };
    if routed && event.is_none() {
        debug!(delivery_id = %delivery_id, event_type, "Ignoring event");
    }

    // A routed kind is archived only when it also decoded into an event.
    let archive_subject = match decode_archive_subject(&payload) {
        Ok(subject) if !routed || event.is_some() => Some(subject),
        Ok(_) => None,
        Err(e) => {
            debug!(
                delivery_id = %delivery_id,
                event_type,
                reason = %e,
                "Delivery has no pull request subject, not archiving"
            );
            None
        }
    };

    if let Some(subject) = archive_subject {
        let sink = app_state.sink().clone();
        let archive_settings = settings.archive.clone();
        let payload = payload.clone();
        let delivery_id = delivery_id.clone();
        let span = info_span!("archive", delivery_id = %delivery_id, subject = %subject);
        tasks.archive = Some(tokio::spawn(
            async move {
                match sink
                    .store(&archive_settings, &subject, &delivery_id, &payload)
                    .await
                {
                    Ok(_) => {}
                    Err(ArchiveError::MissingBucket) => {
                        error!("No archive bucket configured, delivery not archived");
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to archive delivery");
                    }
                }
            }
            .instrument(span),
        ));
    }

    if let Some(event) = event {
        let router = app_state.router().clone();
        let ctx = HandlerContext::for_delivery(
            app_state.github().clone(),
            settings,
            &delivery_id,
            event.kind(),
        );
        let span = ctx.span.clone();
        tasks.dispatch = Some(tokio::spawn(
            async move {
                let report = router.dispatch(&event, &ctx).await;
                debug!(
                    invoked = report.invoked.len(),
                    failed = report.failed.len(),
                    "Delivery dispatched"
                );
            }
            .instrument(span),
        ));
    }

    Ok(tasks)
}

fn header_value(headers: &HeaderMap, name: &'static str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
