//! Team registry endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use reviewer_domain::Team;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::api::require;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_team))
        .route("/get", get(get_team))
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

async fn add_team(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<Team>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let Json(team) = payload.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    require("team_name", &team.team_name, &request_id)?;

    let team = state
        .engine()
        .create_team(team)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

async fn get_team(
    State(state): State<AppState>,
    ctx: RequestContext,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<Team>, ApiError> {
    let request_id = ctx.request_id;
    let Query(query) = query.map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    let team_name = query.team_name.unwrap_or_default();
    require("team_name", &team_name, &request_id)?;

    let team = state
        .engine()
        .get_team(&team_name)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    Ok(Json(team))
}
