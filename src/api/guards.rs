use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::User;
use crate::repositories;
use crate::services::errors::ServiceError;
use crate::services::policy::Policy;

/// The authenticated, active user behind the bearer token.
pub(crate) struct CurrentUser(pub(crate) User);

/// Request policy derived from [`CurrentUser`]; every service call takes one.
pub(crate) struct Actor(pub(crate) Policy);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ServiceError::Unauthenticated)?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ServiceError::Unauthenticated)?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load user"))?
            .filter(|user| user.is_active)
            .ok_or(ServiceError::Unauthenticated)?;

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(Actor(Policy::for_user(&user)))
    }
}
