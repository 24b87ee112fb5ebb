use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use crate::db::models::InterventionCase;
use crate::db::types::{CaseStatus, ProgressStatus};
use crate::services::policy::Scope;

pub(crate) const COLUMNS: &str = "\
    ic.id, ic.student_id, ic.alert_id, ic.assigned_to, ic.created_by, ic.status, ic.version, \
    ic.progress_status, ic.meeting_date, ic.meeting_notes, ic.follow_up_date, \
    ic.escalation_reason, ic.resolution_notes, ic.created_at, ic.updated_at, ic.closed_at";

pub(crate) struct CreateCase<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) alert_id: Option<&'a str>,
    pub(crate) assigned_to: &'a str,
    pub(crate) created_by: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateCase<'_>,
) -> Result<InterventionCase, sqlx::Error> {
    sqlx::query_as::<_, InterventionCase>(&format!(
        "INSERT INTO intervention_cases AS ic (
            id, student_id, alert_id, assigned_to, created_by, status, version,
            progress_status, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,'open',1,'not_started',$6,$6)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.alert_id)
    .bind(params.assigned_to)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_scoped(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    scope: &Scope<'_>,
) -> Result<Option<InterventionCase>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM intervention_cases ic WHERE ic.id = "
    ));
    builder.push_bind(id.to_string());
    scope.push(&mut builder, "ic");
    builder.build_query_as::<InterventionCase>().fetch_optional(executor).await
}

pub(crate) async fn exists(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM intervention_cases WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn has_open_for_alert(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
    alert_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM intervention_cases
            WHERE student_id = $1 AND alert_id = $2 AND status <> 'closed'
         )",
    )
    .bind(student_id)
    .bind(alert_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn count_open_for_alert(
    executor: impl sqlx::PgExecutor<'_>,
    alert_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM intervention_cases WHERE alert_id = $1 AND status <> 'closed'",
    )
    .bind(alert_id)
    .fetch_one(executor)
    .await
}

/// Full post-update state of a case; every column is written.
pub(crate) struct CaseChanges<'a> {
    pub(crate) status: CaseStatus,
    pub(crate) assigned_to: &'a str,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) meeting_date: Option<Date>,
    pub(crate) meeting_notes: Option<&'a str>,
    pub(crate) follow_up_date: Option<Date>,
    pub(crate) escalation_reason: Option<&'a str>,
    pub(crate) resolution_notes: Option<&'a str>,
    pub(crate) closed_at: Option<PrimitiveDateTime>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn update_with_version(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    expected_version: i32,
    changes: CaseChanges<'_>,
) -> Result<Option<InterventionCase>, sqlx::Error> {
    sqlx::query_as::<_, InterventionCase>(&format!(
        "UPDATE intervention_cases AS ic SET
            status = $1,
            assigned_to = $2,
            progress_status = $3,
            meeting_date = $4,
            meeting_notes = $5,
            follow_up_date = $6,
            escalation_reason = $7,
            resolution_notes = $8,
            closed_at = $9,
            updated_at = $10,
            version = ic.version + 1
         WHERE ic.id = $11 AND ic.version = $12
         RETURNING {COLUMNS}"
    ))
    .bind(changes.status)
    .bind(changes.assigned_to)
    .bind(changes.progress_status)
    .bind(changes.meeting_date)
    .bind(changes.meeting_notes)
    .bind(changes.follow_up_date)
    .bind(changes.escalation_reason)
    .bind(changes.resolution_notes)
    .bind(changes.closed_at)
    .bind(changes.updated_at)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
}

#[derive(Debug, Default)]
pub(crate) struct CaseFilters<'a> {
    pub(crate) student_id: Option<&'a str>,
    pub(crate) assigned_to: Option<&'a str>,
    pub(crate) status: Option<CaseStatus>,
}

pub(crate) async fn list_scoped(
    pool: &PgPool,
    scope: &Scope<'_>,
    filters: &CaseFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<InterventionCase>, i64), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM intervention_cases ic WHERE TRUE"
    ));
    push_filters(&mut builder, scope, filters);
    builder.push(" ORDER BY ic.created_at DESC, ic.id OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    let items = builder.build_query_as::<InterventionCase>().fetch_all(pool).await?;

    let mut count =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM intervention_cases ic WHERE TRUE");
    push_filters(&mut count, scope, filters);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((items, total))
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: &Scope<'_>,
    filters: &CaseFilters<'_>,
) {
    scope.push(builder, "ic");
    if let Some(student_id) = filters.student_id {
        builder.push(" AND ic.student_id = ");
        builder.push_bind(student_id.to_string());
    }
    if let Some(assigned_to) = filters.assigned_to {
        builder.push(" AND ic.assigned_to = ");
        builder.push_bind(assigned_to.to_string());
    }
    if let Some(status) = filters.status {
        builder.push(" AND ic.status = ");
        builder.push_bind(status);
    }
}

#[cfg(test)]
pub(crate) async fn list_for_alert(
    pool: &PgPool,
    alert_id: &str,
) -> Result<Vec<InterventionCase>, sqlx::Error> {
    sqlx::query_as::<_, InterventionCase>(&format!(
        "SELECT {COLUMNS} FROM intervention_cases ic WHERE ic.alert_id = $1 ORDER BY ic.created_at, ic.id"
    ))
    .bind(alert_id)
    .fetch_all(pool)
    .await
}
