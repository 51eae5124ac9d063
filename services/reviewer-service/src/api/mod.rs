//! HTTP API handlers and routing.

pub mod error;
mod health;
mod pull_requests;
pub mod request_context;
mod teams;
mod users;

use axum::Router;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/team", teams::routes())
        .nest("/users", users::routes())
        .nest("/pullRequest", pull_requests::routes())
        // Layers run bottom-up: the id is set before tracing sees the request.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Reject a blank required field or query parameter with `INVALID_REQUEST`.
fn require(field: &str, value: &str, request_id: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_request(format!("{field} is required"))
            .with_request_id(request_id));
    }
    Ok(())
}
