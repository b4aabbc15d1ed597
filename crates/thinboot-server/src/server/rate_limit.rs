//! Per-IP limit on the boot endpoints.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::{AppState, ApiError, ClientIp, PlainText};

/// Reject boot requests over the per-IP budget with 429 before any handler
/// runs, so a rejected request touches no client or token state.
pub async fn limit_boot(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    if state.boot_limiter.check(&ip).await {
        return next.run(request).await;
    }

    warn!(
        ip = %ip,
        path = %request.uri().path(),
        limit = state.boot_limiter.limit(),
        "Boot rate limit exceeded"
    );
    PlainText(ApiError::RateLimited).into_response()
}
