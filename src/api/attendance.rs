use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::repositories::attendance::SessionFilters;
use crate::schemas::attendance::{
    AttendanceSessionCreate, RecordedSessionResponse, SessionSummaryResponse,
};
use crate::services::attendance as service;

#[derive(Debug, Deserialize)]
pub(crate) struct SessionListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    classroom_id: Option<String>,
    #[serde(default)]
    subject_id: Option<String>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/sessions", post(record_session).get(list_sessions))
}

async fn record_session(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<AttendanceSessionCreate>,
) -> Result<(StatusCode, Json<RecordedSessionResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let recorded = service::record_session(&state, &policy, payload.into_command()).await?;
    Ok((StatusCode::CREATED, Json(RecordedSessionResponse::from_service(recorded))))
}

async fn list_sessions(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<SessionListQuery>,
) -> Result<Json<PaginatedResponse<SessionSummaryResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let filters = SessionFilters {
        classroom_id: params.classroom_id.as_deref(),
        subject_id: params.subject_id.as_deref(),
    };

    let (rows, total) = service::list_sessions(&state, &policy, filters, skip, limit).await?;
    let items = rows.into_iter().map(SessionSummaryResponse::from_row).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

#[cfg(test)]
mod tests;
