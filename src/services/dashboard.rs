use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::{format_date, format_primitive, month_start, shift_month, today_utc, trailing_month_starts};
use crate::db::models::{Alert, InterventionCase};
use crate::db::types::{AlertStatus, AlertType, CaseStatus, RiskLevel, UserRole};
use crate::repositories::dashboard::{self as queries, AbsenceMonthRow, Window};
use crate::services::dashboard_cache::{filters_hash, CacheKeyParts};
use crate::services::errors::ServiceError;
use crate::services::policy::Policy;
use crate::services::risk::scoring::round2;

const RECENT_LIMIT: i64 = 10;
const ESCALATION_QUEUE_LIMIT: i64 = 20;
const MAX_TREND_MONTHS: u32 = 24;

#[derive(Debug, Clone, Default)]
pub(crate) struct DashboardFilters {
    pub(crate) start_date: Option<Date>,
    pub(crate) end_date: Option<Date>,
    pub(crate) risk_level: Option<RiskLevel>,
    pub(crate) months: Option<u32>,
    pub(crate) timeout_ms: Option<u64>,
}

/// Filters after defaults and bounds are applied; this is what the cache key hashes.
#[derive(Debug, Clone, Copy, Serialize)]
struct ResolvedFilters {
    start_date: Option<Date>,
    end_date: Option<Date>,
    risk_level: Option<RiskLevel>,
    months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DashboardView {
    pub(crate) role: UserRole,
    pub(crate) generated_on: String,
    pub(crate) summary: Summary,
    pub(crate) risk_distribution: Vec<LevelCount>,
    pub(crate) alert_status: Vec<StatusCount>,
    pub(crate) case_status: Vec<StatusCount>,
    pub(crate) alert_trend: Vec<TrendPoint>,
    pub(crate) absence_rate_trend: Vec<TrendPoint>,
    pub(crate) new_alerts: MonthChange,
    pub(crate) top_risk_students: Vec<TopRiskStudent>,
    pub(crate) recent_alerts: Vec<AlertItem>,
    pub(crate) recent_cases: Vec<CaseItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) escalation_queue: Option<Vec<CaseItem>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct Summary {
    pub(crate) students: i64,
    pub(crate) high_risk_students: i64,
    pub(crate) active_alerts: i64,
    pub(crate) open_cases: i64,
    pub(crate) escalated_cases: i64,
    pub(crate) sessions_recorded: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LevelCount {
    pub(crate) level: RiskLevel,
    pub(crate) count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StatusCount {
    pub(crate) status: String,
    pub(crate) count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrendPoint {
    pub(crate) month: String,
    pub(crate) value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct MonthChange {
    pub(crate) current: i64,
    pub(crate) previous: i64,
    pub(crate) change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TopRiskStudent {
    pub(crate) student_id: String,
    pub(crate) admission_number: String,
    pub(crate) full_name: String,
    pub(crate) risk_score: f64,
    pub(crate) risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AlertItem {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) alert_type: AlertType,
    pub(crate) status: AlertStatus,
    pub(crate) risk_level: RiskLevel,
    pub(crate) alert_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CaseItem {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) alert_id: Option<String>,
    pub(crate) assigned_to: String,
    pub(crate) status: CaseStatus,
    pub(crate) created_at: String,
}

impl From<Alert> for AlertItem {
    fn from(alert: Alert) -> Self {
        Self {
            id: alert.id,
            student_id: alert.student_id,
            subject_id: alert.subject_id,
            alert_type: alert.alert_type,
            status: alert.status,
            risk_level: alert.risk_level,
            alert_date: format_date(alert.alert_date),
        }
    }
}

impl From<InterventionCase> for CaseItem {
    fn from(case: InterventionCase) -> Self {
        Self {
            id: case.id,
            student_id: case.student_id,
            alert_id: case.alert_id,
            assigned_to: case.assigned_to,
            status: case.status,
            created_at: format_primitive(case.created_at),
        }
    }
}

/// `(current - previous) / previous * 100`; a zero baseline reads as 100 when anything appeared.
pub(crate) fn percentage_change(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    round2((current - previous) as f64 / previous as f64 * 100.0)
}

/// One point per month start, zero where the query returned nothing.
pub(crate) fn fill_months(months: &[Date], rows: &[(Date, f64)]) -> Vec<TrendPoint> {
    months
        .iter()
        .map(|month| TrendPoint {
            month: format_date(*month),
            value: rows
                .iter()
                .find(|(row_month, _)| row_month == month)
                .map(|(_, value)| *value)
                .unwrap_or(0.0),
        })
        .collect()
}

fn absence_rates(rows: &[AbsenceMonthRow]) -> Vec<(Date, f64)> {
    rows.iter()
        .map(|row| {
            let rate = if row.total == 0 {
                0.0
            } else {
                round2(100.0 * row.absent as f64 / row.total as f64)
            };
            (row.month, rate)
        })
        .collect()
}

fn count_for(rows: &[(Date, i64)], month: Date) -> i64 {
    rows.iter().find(|(row_month, _)| *row_month == month).map(|(_, count)| *count).unwrap_or(0)
}

fn resolve_filters(
    filters: &DashboardFilters,
    default_months: u32,
) -> Result<ResolvedFilters, ServiceError> {
    if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
        if start > end {
            return Err(ServiceError::validation("start_date must not be after end_date"));
        }
    }
    let months = filters.months.unwrap_or(default_months);
    if !(1..=MAX_TREND_MONTHS).contains(&months) {
        return Err(ServiceError::validation(format!(
            "months must be between 1 and {MAX_TREND_MONTHS}"
        )));
    }
    Ok(ResolvedFilters {
        start_date: filters.start_date,
        end_date: filters.end_date,
        risk_level: filters.risk_level,
        months,
    })
}

pub(crate) async fn dashboard(
    state: &AppState,
    policy: &Policy,
    role: &str,
    filters: DashboardFilters,
) -> Result<DashboardView, ServiceError> {
    let role = UserRole::from_str(role).map_err(ServiceError::Validation)?;
    if role != policy.role() {
        return Err(ServiceError::forbidden("Dashboard is not available for this role"));
    }

    let settings = state.settings().dashboard();
    let resolved = resolve_filters(&filters, settings.trend_months)?;
    let timeout_ms = filters
        .timeout_ms
        .map(|requested| requested.clamp(1, settings.timeout_ms))
        .unwrap_or(settings.timeout_ms);

    let today = today_utc();
    let hash = filters_hash(&resolved);
    let parts = CacheKeyParts {
        user_id: policy.user_id(),
        role: role.as_str(),
        filters_hash: &hash,
        date: today,
    };

    let work = state
        .dashboard_cache()
        .get_or_compute(parts, || build(state, policy, role, resolved, today));

    within_deadline(role, timeout_ms, work).await
}

/// Drops `work` once `timeout_ms` elapses instead of waiting on slow aggregates.
async fn within_deadline<T>(
    role: UserRole,
    timeout_ms: u64,
    work: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), work).await.map_err(|_| {
        tracing::warn!(role = role.as_str(), timeout_ms, "Dashboard aggregation timed out");
        ServiceError::Timeout(format!("Dashboard did not complete within {timeout_ms} ms"))
    })?
}

async fn build(
    state: &AppState,
    policy: &Policy,
    role: UserRole,
    filters: ResolvedFilters,
    today: Date,
) -> Result<DashboardView, ServiceError> {
    let started = Instant::now();
    let pool = state.db();
    let window = Window {
        start_date: filters.start_date,
        end_date: filters.end_date,
        risk_level: filters.risk_level,
    };

    let months = trailing_month_starts(today, filters.months);
    let current_month = month_start(today);
    let previous_month = shift_month(today, -1);
    let trend_from = months.first().copied().unwrap_or(current_month).min(previous_month);
    let top_n = state.settings().dashboard().top_n;

    let (students, distribution, alert_counts, case_counts, sessions) = tokio::try_join!(
        queries::count_students(pool, policy),
        queries::risk_distribution(pool, policy),
        queries::alert_status_counts(pool, policy, &window),
        queries::case_status_counts(pool, policy, &window),
        queries::count_sessions(pool, policy, &window),
    )
    .map_err(|e| ServiceError::database(e, "Failed to aggregate dashboard counts"))?;

    let (alerts_monthly, absences_monthly, top_risk, recent_alerts, recent_cases) = tokio::try_join!(
        queries::alerts_per_month(pool, policy, &window, trend_from),
        queries::absences_per_month(pool, policy, trend_from),
        queries::top_risk_students(pool, policy, &window, top_n),
        queries::recent_alerts(pool, policy, &window, None, RECENT_LIMIT),
        queries::recent_cases(pool, policy, &window, None, RECENT_LIMIT),
    )
    .map_err(|e| ServiceError::database(e, "Failed to aggregate dashboard trends"))?;

    let escalation_queue = if role == UserRole::Admin {
        let queue = queries::recent_cases(
            pool,
            policy,
            &Window::default(),
            Some(CaseStatus::EscalatedToAdmin),
            ESCALATION_QUEUE_LIMIT,
        )
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load escalation queue"))?;
        Some(queue.into_iter().map(CaseItem::from).collect())
    } else {
        None
    };

    let level_count =
        |level: RiskLevel| distribution.iter().find(|(l, _)| *l == level).map_or(0, |(_, c)| *c);
    let alert_count =
        |status: AlertStatus| alert_counts.iter().find(|(s, _)| *s == status).map_or(0, |(_, c)| *c);
    let case_count =
        |status: CaseStatus| case_counts.iter().find(|(s, _)| *s == status).map_or(0, |(_, c)| *c);

    let summary = Summary {
        students,
        high_risk_students: level_count(RiskLevel::High) + level_count(RiskLevel::Critical),
        active_alerts: alert_count(AlertStatus::Active),
        open_cases: CaseStatus::ALL
            .iter()
            .filter(|status| **status != CaseStatus::Closed)
            .map(|status| case_count(*status))
            .sum(),
        escalated_cases: case_count(CaseStatus::EscalatedToAdmin),
        sessions_recorded: sessions,
    };

    let alert_points: Vec<(Date, f64)> =
        alerts_monthly.iter().map(|(month, count)| (*month, *count as f64)).collect();
    let current = count_for(&alerts_monthly, current_month);
    let previous = count_for(&alerts_monthly, previous_month);

    let view = DashboardView {
        role,
        generated_on: format_date(today),
        summary,
        risk_distribution: RiskLevel::ALL
            .iter()
            .map(|level| LevelCount { level: *level, count: level_count(*level) })
            .collect(),
        alert_status: AlertStatus::ALL
            .iter()
            .map(|status| StatusCount { status: status.to_string(), count: alert_count(*status) })
            .collect(),
        case_status: CaseStatus::ALL
            .iter()
            .map(|status| StatusCount { status: status.to_string(), count: case_count(*status) })
            .collect(),
        alert_trend: fill_months(&months, &alert_points),
        absence_rate_trend: fill_months(&months, &absence_rates(&absences_monthly)),
        new_alerts: MonthChange {
            current,
            previous,
            change_percent: percentage_change(current, previous),
        },
        top_risk_students: top_risk
            .into_iter()
            .map(|row| TopRiskStudent {
                student_id: row.student_id,
                admission_number: row.admission_number,
                full_name: row.full_name,
                risk_score: row.risk_score,
                risk_level: row.risk_level,
            })
            .collect(),
        recent_alerts: recent_alerts.into_iter().map(AlertItem::from).collect(),
        recent_cases: recent_cases.into_iter().map(CaseItem::from).collect(),
        escalation_queue,
    };

    metrics::dashboard_built(role.as_str(), started.elapsed());
    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use time::macros::date;

    use super::{fill_months, percentage_change, resolve_filters, within_deadline, DashboardFilters};
    use crate::api::errors::ApiError;
    use crate::db::types::UserRole;
    use crate::services::errors::ServiceError;

    #[test]
    fn percentage_change_handles_zero_baseline() {
        assert_eq!(percentage_change(5, 0), 100.0);
        assert_eq!(percentage_change(0, 0), 0.0);
        assert_eq!(percentage_change(3, 4), -25.0);
        assert_eq!(percentage_change(4, 3), 33.33);
    }

    #[test]
    fn missing_months_are_zero_filled() {
        let months = [date!(2024 - 07 - 01), date!(2024 - 08 - 01), date!(2024 - 09 - 01)];
        let points = fill_months(&months, &[(date!(2024 - 08 - 01), 4.0)]);
        let values: Vec<f64> = points.iter().map(|point| point.value).collect();
        assert_eq!(values, vec![0.0, 4.0, 0.0]);
        assert_eq!(points[0].month, "2024-07-01");
    }

    #[test]
    fn filters_are_bounded() {
        let too_many = DashboardFilters { months: Some(25), ..DashboardFilters::default() };
        assert_eq!(resolve_filters(&too_many, 6).unwrap_err().kind(), "validation_error");

        let inverted = DashboardFilters {
            start_date: Some(date!(2024 - 10 - 01)),
            end_date: Some(date!(2024 - 09 - 01)),
            ..DashboardFilters::default()
        };
        assert_eq!(resolve_filters(&inverted, 6).unwrap_err().kind(), "validation_error");

        let defaults = resolve_filters(&DashboardFilters::default(), 6).expect("defaults");
        assert_eq!(defaults.months, 6);
    }

    #[tokio::test]
    async fn slow_aggregation_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, ServiceError>(1)
        };
        let err = within_deadline(UserRole::Admin, 20, slow).await.unwrap_err();

        assert_eq!(err.kind(), "timeout");
        assert_eq!(ApiError::from(err).into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn fast_aggregation_passes_through() {
        let value = within_deadline(UserRole::Teacher, 500, async { Ok::<_, ServiceError>(3) })
            .await
            .expect("value");
        assert_eq!(value, 3);
    }
}
