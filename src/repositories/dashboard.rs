use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;

use crate::db::models::{Alert, InterventionCase};
use crate::db::types::{AlertStatus, CaseStatus, RiskLevel};
use crate::repositories::{alerts, cases};
use crate::services::policy::{Policy, QueryKind};

/// Caller filters shared by every section.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Window {
    pub(crate) start_date: Option<Date>,
    pub(crate) end_date: Option<Date>,
    pub(crate) risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TopRiskRow {
    pub(crate) student_id: String,
    pub(crate) admission_number: String,
    pub(crate) full_name: String,
    pub(crate) risk_score: f64,
    pub(crate) risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct AbsenceMonthRow {
    pub(crate) month: Date,
    pub(crate) absent: i64,
    pub(crate) total: i64,
}

fn push_alert_window(builder: &mut QueryBuilder<'_, Postgres>, window: &Window) {
    if let Some(start) = window.start_date {
        builder.push(" AND a.alert_date >= ");
        builder.push_bind(start);
    }
    if let Some(end) = window.end_date {
        builder.push(" AND a.alert_date <= ");
        builder.push_bind(end);
    }
    if let Some(level) = window.risk_level {
        builder.push(" AND a.risk_level = ");
        builder.push_bind(level);
    }
}

fn push_case_window(builder: &mut QueryBuilder<'_, Postgres>, window: &Window) {
    if let Some(start) = window.start_date {
        builder.push(" AND ic.created_at::date >= ");
        builder.push_bind(start);
    }
    if let Some(end) = window.end_date {
        builder.push(" AND ic.created_at::date <= ");
        builder.push_bind(end);
    }
}

fn push_session_window(builder: &mut QueryBuilder<'_, Postgres>, window: &Window) {
    if let Some(start) = window.start_date {
        builder.push(" AND s.session_date >= ");
        builder.push_bind(start);
    }
    if let Some(end) = window.end_date {
        builder.push(" AND s.session_date <= ");
        builder.push_bind(end);
    }
}

pub(crate) async fn count_students(pool: &PgPool, policy: &Policy) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM students st WHERE st.is_active");
    policy.scope(QueryKind::Students).push(&mut builder, "st");
    builder.build_query_scalar().fetch_one(pool).await
}

pub(crate) async fn risk_distribution(
    pool: &PgPool,
    policy: &Policy,
) -> Result<Vec<(RiskLevel, i64)>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT p.risk_level, COUNT(*)
         FROM students st
         JOIN student_risk_profiles p ON p.student_id = st.id
         WHERE st.is_active",
    );
    policy.scope(QueryKind::Students).push(&mut builder, "st");
    builder.push(" GROUP BY p.risk_level");
    builder.build_query_as::<(RiskLevel, i64)>().fetch_all(pool).await
}

pub(crate) async fn alert_status_counts(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
) -> Result<Vec<(AlertStatus, i64)>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT a.status, COUNT(*) FROM alerts a WHERE TRUE");
    policy.scope(QueryKind::Alerts).push(&mut builder, "a");
    push_alert_window(&mut builder, window);
    builder.push(" GROUP BY a.status");
    builder.build_query_as::<(AlertStatus, i64)>().fetch_all(pool).await
}

pub(crate) async fn case_status_counts(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
) -> Result<Vec<(CaseStatus, i64)>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT ic.status, COUNT(*) FROM intervention_cases ic WHERE TRUE",
    );
    policy.scope(QueryKind::Cases).push(&mut builder, "ic");
    push_case_window(&mut builder, window);
    builder.push(" GROUP BY ic.status");
    builder.build_query_as::<(CaseStatus, i64)>().fetch_all(pool).await
}

pub(crate) async fn count_sessions(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM attendance_sessions s WHERE TRUE");
    policy.scope(QueryKind::Sessions).push(&mut builder, "s");
    push_session_window(&mut builder, window);
    builder.build_query_scalar().fetch_one(pool).await
}

/// Alerts raised per calendar month since `from` (a month start).
pub(crate) async fn alerts_per_month(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
    from: Date,
) -> Result<Vec<(Date, i64)>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT date_trunc('month', a.alert_date::timestamp)::date AS month, COUNT(*)
         FROM alerts a WHERE a.alert_date >= ",
    );
    builder.push_bind(from);
    policy.scope(QueryKind::Alerts).push(&mut builder, "a");
    if let Some(level) = window.risk_level {
        builder.push(" AND a.risk_level = ");
        builder.push_bind(level);
    }
    builder.push(" GROUP BY 1 ORDER BY 1");
    builder.build_query_as::<(Date, i64)>().fetch_all(pool).await
}

/// Absent and total records per calendar month since `from`, over visible sessions.
pub(crate) async fn absences_per_month(
    pool: &PgPool,
    policy: &Policy,
    from: Date,
) -> Result<Vec<AbsenceMonthRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT date_trunc('month', s.session_date::timestamp)::date AS month,
                COUNT(*) FILTER (WHERE r.status = 'absent') AS absent,
                COUNT(*) AS total
         FROM attendance_records r
         JOIN attendance_sessions s ON s.id = r.session_id
         WHERE s.session_date >= ",
    );
    builder.push_bind(from);
    policy.scope(QueryKind::Sessions).push(&mut builder, "s");
    builder.push(" GROUP BY 1 ORDER BY 1");
    builder.build_query_as::<AbsenceMonthRow>().fetch_all(pool).await
}

pub(crate) async fn top_risk_students(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
    limit: i64,
) -> Result<Vec<TopRiskRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT st.id AS student_id, st.admission_number, st.full_name,
                p.risk_score, p.risk_level
         FROM students st
         JOIN student_risk_profiles p ON p.student_id = st.id
         WHERE st.is_active",
    );
    policy.scope(QueryKind::Students).push(&mut builder, "st");
    if let Some(level) = window.risk_level {
        builder.push(" AND p.risk_level = ");
        builder.push_bind(level);
    }
    builder.push(" ORDER BY p.risk_score DESC, st.full_name, st.id LIMIT ");
    builder.push_bind(limit);
    builder.build_query_as::<TopRiskRow>().fetch_all(pool).await
}

pub(crate) async fn recent_alerts(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
    status: Option<AlertStatus>,
    limit: i64,
) -> Result<Vec<Alert>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM alerts a WHERE TRUE",
        alerts::COLUMNS
    ));
    policy.scope(QueryKind::Alerts).push(&mut builder, "a");
    push_alert_window(&mut builder, window);
    if let Some(status) = status {
        builder.push(" AND a.status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY a.alert_date DESC, a.created_at DESC, a.id LIMIT ");
    builder.push_bind(limit);
    builder.build_query_as::<Alert>().fetch_all(pool).await
}

pub(crate) async fn recent_cases(
    pool: &PgPool,
    policy: &Policy,
    window: &Window,
    status: Option<CaseStatus>,
    limit: i64,
) -> Result<Vec<InterventionCase>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM intervention_cases ic WHERE TRUE",
        cases::COLUMNS
    ));
    policy.scope(QueryKind::Cases).push(&mut builder, "ic");
    push_case_window(&mut builder, window);
    if let Some(status) = status {
        builder.push(" AND ic.status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY ic.created_at DESC, ic.id LIMIT ");
    builder.push_bind(limit);
    builder.build_query_as::<InterventionCase>().fetch_all(pool).await
}
