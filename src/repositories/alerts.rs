use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use crate::db::models::Alert;
use crate::db::types::{AlertStatus, AlertType, RiskLevel};
use crate::services::policy::Scope;

pub(crate) const COLUMNS: &str = "\
    a.id, a.student_id, a.subject_id, a.alert_type, a.status, a.risk_level, a.assigned_to, \
    a.escalated_to_admin, a.alert_date, a.created_by, a.version, a.created_at, a.updated_at, \
    a.resolved_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UpsertedAlert {
    #[sqlx(flatten)]
    pub(crate) alert: Alert,
    pub(crate) inserted: bool,
}

pub(crate) struct UpsertActive<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) alert_type: AlertType,
    pub(crate) risk_level: RiskLevel,
    pub(crate) assigned_to: Option<&'a str>,
    pub(crate) alert_date: Date,
    pub(crate) now: PrimitiveDateTime,
}

/// Creates the active alert for the triple or refreshes the risk level of the existing one.
/// Status and assignment of an existing alert are left untouched.
pub(crate) async fn upsert_active(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertActive<'_>,
) -> Result<UpsertedAlert, sqlx::Error> {
    sqlx::query_as::<_, UpsertedAlert>(&format!(
        "INSERT INTO alerts AS a (
            id, student_id, subject_id, alert_type, status, risk_level, assigned_to,
            escalated_to_admin, alert_date, created_by, version, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,'active',$5,$6,FALSE,$7,NULL,1,$8,$8)
         ON CONFLICT (student_id, (COALESCE(subject_id, '')), alert_type)
            WHERE status = 'active'
         DO UPDATE SET
            risk_level = EXCLUDED.risk_level,
            version = a.version
                + CASE WHEN a.risk_level <> EXCLUDED.risk_level THEN 1 ELSE 0 END,
            updated_at = CASE WHEN a.risk_level <> EXCLUDED.risk_level
                THEN EXCLUDED.updated_at ELSE a.updated_at END
         RETURNING {COLUMNS}, (xmax = 0) AS inserted"
    ))
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.subject_id)
    .bind(params.alert_type)
    .bind(params.risk_level)
    .bind(params.assigned_to)
    .bind(params.alert_date)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) struct CreateAlert<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) alert_type: AlertType,
    pub(crate) risk_level: RiskLevel,
    pub(crate) assigned_to: Option<&'a str>,
    pub(crate) alert_date: Date,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

/// Plain insert; a live active alert for the same triple surfaces as a unique violation.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAlert<'_>,
) -> Result<Alert, sqlx::Error> {
    sqlx::query_as::<_, Alert>(&format!(
        "INSERT INTO alerts AS a (
            id, student_id, subject_id, alert_type, status, risk_level, assigned_to,
            escalated_to_admin, alert_date, created_by, version, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,'active',$5,$6,FALSE,$7,$8,1,$9,$9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.subject_id)
    .bind(params.alert_type)
    .bind(params.risk_level)
    .bind(params.assigned_to)
    .bind(params.alert_date)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Alert>, sqlx::Error> {
    sqlx::query_as::<_, Alert>(&format!("SELECT {COLUMNS} FROM alerts a WHERE a.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_scoped(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    scope: &Scope<'_>,
) -> Result<Option<Alert>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM alerts a WHERE a.id = "));
    builder.push_bind(id.to_string());
    scope.push(&mut builder, "a");
    builder.build_query_as::<Alert>().fetch_optional(executor).await
}

pub(crate) async fn lock_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: &str,
) -> Result<Option<Alert>, sqlx::Error> {
    sqlx::query_as::<_, Alert>(&format!(
        "SELECT {COLUMNS} FROM alerts a WHERE a.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

pub(crate) struct AlertChanges<'a> {
    pub(crate) status: AlertStatus,
    pub(crate) assigned_to: Option<&'a str>,
    pub(crate) escalated_to_admin: bool,
    pub(crate) resolved_at: Option<PrimitiveDateTime>,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Writes the full mutable state of the alert if the stored version still matches.
/// Returns `None` when the row is gone or the version moved.
pub(crate) async fn update_with_version(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    expected_version: i32,
    changes: AlertChanges<'_>,
) -> Result<Option<Alert>, sqlx::Error> {
    sqlx::query_as::<_, Alert>(&format!(
        "UPDATE alerts AS a SET
            status = $1,
            assigned_to = $2,
            escalated_to_admin = $3,
            resolved_at = $4,
            updated_at = $5,
            version = a.version + 1
         WHERE a.id = $6 AND a.version = $7
         RETURNING {COLUMNS}"
    ))
    .bind(changes.status)
    .bind(changes.assigned_to)
    .bind(changes.escalated_to_admin)
    .bind(changes.resolved_at)
    .bind(changes.updated_at)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
}

#[derive(Debug, Default)]
pub(crate) struct AlertFilters<'a> {
    pub(crate) student_id: Option<&'a str>,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) status: Option<AlertStatus>,
}

pub(crate) async fn list_scoped(
    pool: &PgPool,
    scope: &Scope<'_>,
    filters: &AlertFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Alert>, i64), sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM alerts a WHERE TRUE"));
    push_filters(&mut builder, scope, filters);
    builder.push(" ORDER BY a.alert_date DESC, a.created_at DESC, a.id OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    let items = builder.build_query_as::<Alert>().fetch_all(pool).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM alerts a WHERE TRUE");
    push_filters(&mut count, scope, filters);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((items, total))
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: &Scope<'_>,
    filters: &AlertFilters<'_>,
) {
    scope.push(builder, "a");
    if let Some(student_id) = filters.student_id {
        builder.push(" AND a.student_id = ");
        builder.push_bind(student_id.to_string());
    }
    if let Some(subject_id) = filters.subject_id {
        builder.push(" AND a.subject_id = ");
        builder.push_bind(subject_id.to_string());
    }
    if let Some(status) = filters.status {
        builder.push(" AND a.status = ");
        builder.push_bind(status);
    }
}

#[cfg(test)]
pub(crate) async fn count_active_for(
    pool: &PgPool,
    student_id: &str,
    alert_type: AlertType,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM alerts WHERE student_id = $1 AND alert_type = $2 AND status = 'active'",
    )
    .bind(student_id)
    .bind(alert_type)
    .fetch_one(pool)
    .await
}
