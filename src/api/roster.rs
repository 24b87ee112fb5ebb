use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::schemas::roster::{
    AssignmentCreate, AssignmentResponse, ClassroomCreate, ClassroomResponse, SubjectCreate,
    SubjectResponse,
};
use crate::services::roster::{self, NewAssignment, NewClassroom};

#[derive(Debug, Deserialize)]
pub(crate) struct ClassroomListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub(crate) fn classrooms_router() -> Router<AppState> {
    Router::new().route("/", get(list_classrooms).post(create_classroom))
}

pub(crate) fn subjects_router() -> Router<AppState> {
    Router::new().route("/", get(list_subjects).post(create_subject))
}

pub(crate) fn assignments_router() -> Router<AppState> {
    Router::new().route("/", post(create_assignment))
}

async fn list_classrooms(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<ClassroomListQuery>,
) -> Result<Json<PaginatedResponse<ClassroomResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let (classrooms, total) = roster::list_classrooms(&state, &policy, skip, limit).await?;
    let items = classrooms.into_iter().map(ClassroomResponse::from_db).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

async fn create_classroom(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<ClassroomCreate>,
) -> Result<(StatusCode, Json<ClassroomResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let classroom = roster::create_classroom(
        &state,
        &policy,
        NewClassroom {
            name: payload.name.trim().to_string(),
            academic_year: payload.academic_year.trim().to_string(),
            form_master_id: payload.form_master_id.filter(|id| !id.trim().is_empty()),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ClassroomResponse::from_db(classroom))))
}

async fn list_subjects(
    State(state): State<AppState>,
    Actor(_policy): Actor,
) -> Result<Json<Vec<SubjectResponse>>, ApiError> {
    let subjects = roster::list_subjects(&state).await?;
    Ok(Json(subjects.into_iter().map(SubjectResponse::from_db).collect()))
}

async fn create_subject(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<SubjectCreate>,
) -> Result<(StatusCode, Json<SubjectResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let subject = roster::create_subject(&state, &policy, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(SubjectResponse::from_db(subject))))
}

async fn create_assignment(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let assignment = roster::create_teaching_assignment(
        &state,
        &policy,
        NewAssignment {
            teacher_id: payload.teacher_id,
            subject_id: payload.subject_id,
            classroom_id: payload.classroom_id,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_db(assignment))))
}
