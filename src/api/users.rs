use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::patch, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{Actor, CurrentUser};
use crate::api::pagination::{self, default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::db::types::UserRole;
use crate::schemas::roster::{UserCreate, UserResponse, UserUpdate};
use crate::services::roster::{self, NewUser, UserPatch};

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    role: Option<UserRole>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", patch(update_user))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn list_users(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Query(params): Query<UserListQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    let (skip, limit) = pagination::bounds(params.skip, params.limit);
    let (users, total) = roster::list_users(&state, &policy, params.role, skip, limit).await?;
    let items = users.into_iter().map(UserResponse::from_db).collect();
    Ok(Json(PaginatedResponse::new(items, total, skip, limit)))
}

async fn create_user(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let user = roster::create_user(
        &state,
        &policy,
        NewUser {
            email: payload.email.trim().to_string(),
            full_name: payload.full_name.trim().to_string(),
            role: payload.role,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn update_user(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(user_id): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let user = roster::update_user(
        &state,
        &policy,
        &user_id,
        UserPatch {
            full_name: payload.full_name,
            role: payload.role,
            is_active: payload.is_active,
        },
    )
    .await?;
    Ok(Json(UserResponse::from_db(user)))
}
