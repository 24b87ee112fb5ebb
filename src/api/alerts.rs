use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::db::types::AlertStatus;
use crate::repositories::alerts::AlertFilters;
use crate::schemas::alert::{AlertCreate, AlertResponse, AlertUpdate};
use crate::services::alerts as service;

#[derive(Debug, Deserialize)]
pub(crate) struct AlertListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default)]
    status: Option<AlertStatus>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts).post(create_alert))
        .route("/:alert_id", get(get_alert).patch(update_alert))
}

async fn list_alerts(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<AlertListQuery>,
) -> Result<Json<PaginatedResponse<AlertResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let filters = AlertFilters {
        student_id: params.student_id.as_deref(),
        subject_id: params.subject_id.as_deref(),
        status: params.status,
    };

    let (alerts, total) = service::list_alerts(&state, &policy, filters, skip, limit).await?;
    let items = alerts.into_iter().map(AlertResponse::from_db).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

async fn get_alert(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(alert_id): Path<String>,
) -> Result<Json<AlertResponse>, ApiError> {
    let alert = service::get_alert(&state, &policy, &alert_id).await?;
    Ok(Json(AlertResponse::from_db(alert)))
}

async fn create_alert(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<AlertCreate>,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let alert = service::create_alert(&state, &policy, payload.into_new_alert()).await?;
    Ok((StatusCode::CREATED, Json(AlertResponse::from_db(alert))))
}

async fn update_alert(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(alert_id): Path<String>,
    Json(payload): Json<AlertUpdate>,
) -> Result<Json<AlertResponse>, ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let alert = service::update_alert(&state, &policy, &alert_id, payload.into_patch()).await?;
    Ok(Json(AlertResponse::from_db(alert)))
}
