use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::db::types::CaseStatus;
use crate::repositories::cases::CaseFilters;
use crate::schemas::case::{
    CaseCreate, CaseDetailResponse, CaseResponse, CaseUpdate, MeetingCreate, MeetingResponse,
    ProgressCreate, ProgressResponse,
};
use crate::services::cases as service;

#[derive(Debug, Deserialize)]
pub(crate) struct CaseListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    status: Option<CaseStatus>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cases).post(create_case))
        .route("/:case_id", get(get_case).patch(update_case))
        .route("/:case_id/meetings", post(add_meeting))
        .route("/:case_id/progress", post(add_progress_update))
}

async fn list_cases(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<CaseListQuery>,
) -> Result<Json<PaginatedResponse<CaseResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let filters = CaseFilters {
        student_id: params.student_id.as_deref(),
        assigned_to: params.assigned_to.as_deref(),
        status: params.status,
    };

    let (cases, total) = service::list_cases(&state, &policy, filters, skip, limit).await?;
    let items = cases.into_iter().map(CaseResponse::from_db).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

async fn get_case(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(case_id): Path<String>,
) -> Result<Json<CaseDetailResponse>, ApiError> {
    let detail = service::get_case(&state, &policy, &case_id).await?;
    Ok(Json(CaseDetailResponse::from_service(detail)))
}

async fn create_case(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<CaseCreate>,
) -> Result<(StatusCode, Json<CaseResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let case = service::create_case(&state, &policy, payload.into_new_case()).await?;
    Ok((StatusCode::CREATED, Json(CaseResponse::from_db(case))))
}

async fn update_case(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(case_id): Path<String>,
    Json(payload): Json<CaseUpdate>,
) -> Result<Json<CaseResponse>, ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let case = service::update_case(&state, &policy, &case_id, payload.into_patch()).await?;
    Ok(Json(CaseResponse::from_db(case)))
}

async fn add_meeting(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(case_id): Path<String>,
    Json(payload): Json<MeetingCreate>,
) -> Result<(StatusCode, Json<MeetingResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let meeting =
        service::add_meeting(&state, &policy, &case_id, payload.meeting_date, &payload.notes)
            .await?;
    Ok((StatusCode::CREATED, Json(MeetingResponse::from_db(meeting))))
}

async fn add_progress_update(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(case_id): Path<String>,
    Json(payload): Json<ProgressCreate>,
) -> Result<(StatusCode, Json<ProgressResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let update = service::add_progress_update(
        &state,
        &policy,
        &case_id,
        &payload.note,
        payload.progress_status,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ProgressResponse::from_db(update))))
}

#[cfg(test)]
mod tests;
