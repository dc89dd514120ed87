use crate::api::AppState;
use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::middleware::Next;
use axum::response::Response;

/// Records the governor's verdict for every request that reaches a rate limited route.
pub async fn log_rate_limit_events(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let retry_after = response
        .headers()
        .get("x-ratelimit-after")
        .or_else(|| response.headers().get(RETRY_AFTER))
        .and_then(|v| v.to_str().ok());
    state.rate_limit_service.log_decision(response.status(), retry_after);

    response
}
