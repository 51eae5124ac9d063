//! Pull request lifecycle endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use reviewer_domain::{CreatePullRequest, PullRequest, ReassignRequest};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::api::require;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_pull_request))
        .route("/merge", post(merge_pull_request))
        .route("/reassign", post(reassign_reviewer))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MergeRequest {
    pub pull_request_id: String,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: String,
}

async fn create_pull_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<CreatePullRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let Json(req) = payload.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    if let Some(field) = req.missing_fields().first() {
        return Err(ApiError::invalid_request(format!("{field} is required"))
            .with_request_id(&request_id));
    }

    let pr = state
        .engine()
        .create_pull_request(req)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

async fn merge_pull_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let request_id = ctx.request_id;
    let Json(req) = payload.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    require("pull_request_id", &req.pull_request_id, &request_id)?;

    let pr = state
        .engine()
        .merge_pull_request(&req.pull_request_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok(Json(PullRequestResponse { pr }))
}

async fn reassign_reviewer(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiError> {
    let request_id = ctx.request_id;
    let Json(req) = payload.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    require("pull_request_id", &req.pull_request_id, &request_id)?;
    require("old_user_id", &req.old_user_id, &request_id)?;

    let reassignment = state
        .engine()
        .reassign_reviewer(req)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok(Json(ReassignResponse {
        pr: reassignment.pull_request,
        replaced_by: reassignment.replaced_by,
    }))
}
