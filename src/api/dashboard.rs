use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use time::Date;

use crate::api::errors::ApiError;
use crate::api::guards::Actor;
use crate::core::state::AppState;
use crate::db::types::RiskLevel;
use crate::services::dashboard::{self as service, DashboardFilters, DashboardView};

#[derive(Debug, Deserialize)]
pub(crate) struct DashboardQuery {
    #[serde(default, deserialize_with = "crate::schemas::deserialize_optional_date")]
    start_date: Option<Date>,
    #[serde(default, deserialize_with = "crate::schemas::deserialize_optional_date")]
    end_date: Option<Date>,
    #[serde(default)]
    risk_level: Option<RiskLevel>,
    #[serde(default)]
    months: Option<u32>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:role", get(dashboard))
}

async fn dashboard(
    State(state): State<AppState>,
    Actor(policy): Actor,
    Path(role): Path<String>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<DashboardView>, ApiError> {
    let filters = DashboardFilters {
        start_date: params.start_date,
        end_date: params.end_date,
        risk_level: params.risk_level,
        months: params.months,
        timeout_ms: params.timeout_ms,
    };

    let view = service::dashboard(&state, &policy, &role, filters).await?;
    Ok(Json(view))
}
