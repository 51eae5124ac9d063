//! User activity and review listing endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use reviewer_domain::{PullRequestShort, User};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::api::require;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/setIsActive", post(set_is_active))
        .route("/getReview", get(get_review))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetIsActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub user_id: String,
    pub pull_requests: Vec<PullRequestShort>,
}

async fn set_is_active(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let request_id = ctx.request_id;
    let Json(req) = payload.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    require("user_id", &req.user_id, &request_id)?;

    let user = state
        .engine()
        .set_user_active(&req.user_id, req.is_active)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok(Json(UserResponse { user }))
}

async fn get_review(
    State(state): State<AppState>,
    ctx: RequestContext,
    query: Result<Query<ReviewQuery>, QueryRejection>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let request_id = ctx.request_id;
    let Query(query) = query.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    let user_id = query.user_id.unwrap_or_default();
    require("user_id", &user_id, &request_id)?;

    let pull_requests = state
        .engine()
        .get_user_reviews(&user_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok(Json(ReviewResponse {
        user_id,
        pull_requests,
    }))
}
