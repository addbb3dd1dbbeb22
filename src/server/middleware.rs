use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use super::state::AppState;
use crate::error::{CrmError, ErrorCategory};
use crate::resource_limits::client_key;

const NOTIFICATIONS_PATH: &str = "/api/notifications";

fn header<'a>(request: &'a Request<Body>, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Concurrency cap, then per-client rate limits. The guard is held until the
/// response is produced.
pub(crate) async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let _guard = match state.limits.try_acquire_request() {
        Ok(guard) => guard,
        Err(e) => return CrmError::from(e).into_response(),
    };

    let client = client_key(header(&request, "x-forwarded-for"), header(&request, "x-real-ip"));
    if let Err(e) = state.rate_limiter.check(&client) {
        tracing::warn!(client = %client, "Rate limit exceeded");
        return CrmError::from(e).into_response();
    }
    if request.method() == Method::POST && request.uri().path() == NOTIFICATIONS_PATH {
        if let Err(e) = state.notification_limiter.check(&client) {
            tracing::warn!(client = %client, "Notification rate limit exceeded");
            return CrmError::from(e).into_response();
        }
    }

    next.run(request).await
}

/// Request span, latency and error-category counters.
pub(crate) async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let span = tracing::info_span!(
        "http.request",
        method = %request.method(),
        route = %request.uri().path(),
    );

    let response = next.run(request).instrument(span.clone()).await;

    let elapsed = started.elapsed();
    state.metrics.record_request(elapsed.as_micros() as usize);
    if let Some(category) = response.extensions().get::<ErrorCategory>() {
        state.metrics.record_error(*category);
    }
    span.in_scope(|| {
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request complete"
        )
    });
    response
}
