//! Liveness probe endpoint.

use axum::http::StatusCode;

/// Returns 200 with the text "OK" while the server accepts connections.
///
/// Mounted on both `/` and `/health`; older deployments probe the root path.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
