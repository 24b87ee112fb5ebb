use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::schemas::history::StudentHistoryResponse;
use crate::schemas::roster::{EnrollmentCreate, EnrollmentResponse, StudentCreate, StudentResponse};
use crate::services::{history, roster};

#[derive(Debug, Deserialize)]
pub(crate) struct StudentListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    classroom_id: Option<String>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route("/:student_id/history", get(student_history))
        .route("/:student_id/enrollments", post(enroll_student))
}

async fn list_students(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<StudentListQuery>,
) -> Result<Json<PaginatedResponse<StudentResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let (students, total) =
        roster::list_students(&state, &policy, params.classroom_id.as_deref(), skip, limit).await?;
    let items = students.into_iter().map(StudentResponse::from_db).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

async fn create_student(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<StudentCreate>,
) -> Result<(StatusCode, Json<StudentResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let student =
        roster::create_student(&state, &policy, payload.admission_number.trim(), payload.full_name.trim())
            .await?;
    Ok((StatusCode::CREATED, Json(StudentResponse::from_db(student))))
}

async fn student_history(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(student_id): Path<String>,
) -> Result<Json<StudentHistoryResponse>, ApiError> {
    let history = history::get_student_history(&state, &policy, &student_id).await?;
    Ok(Json(StudentHistoryResponse::from_service(history)))
}

async fn enroll_student(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(student_id): Path<String>,
    Json(payload): Json<EnrollmentCreate>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let enrollment =
        roster::enroll_student(&state, &policy, &student_id, &payload.classroom_id).await?;
    Ok((StatusCode::CREATED, Json(EnrollmentResponse::from_db(enrollment))))
}

#[cfg(test)]
mod tests;
