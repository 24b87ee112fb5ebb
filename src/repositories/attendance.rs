use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;

use crate::db::models::AttendanceSession;
use crate::db::types::AttendanceStatus;
use crate::services::policy::Scope;

const SESSION_COLUMNS: &str =
    "s.id, s.classroom_id, s.subject_id, s.session_date, s.recorded_by, s.created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct HistoryRow {
    pub(crate) subject_id: String,
    pub(crate) session_date: Date,
    pub(crate) status: AttendanceStatus,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RecentAttendanceRow {
    pub(crate) session_id: String,
    pub(crate) subject_id: String,
    pub(crate) subject_name: String,
    pub(crate) session_date: Date,
    pub(crate) status: AttendanceStatus,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SessionSummaryRow {
    #[sqlx(flatten)]
    pub(crate) session: AttendanceSession,
    pub(crate) record_count: i64,
    pub(crate) absent_count: i64,
}

pub(crate) async fn session_exists(
    executor: impl sqlx::PgExecutor<'_>,
    classroom_id: &str,
    subject_id: &str,
    session_date: Date,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM attendance_sessions
            WHERE classroom_id = $1 AND subject_id = $2 AND session_date = $3
         )",
    )
    .bind(classroom_id)
    .bind(subject_id)
    .bind(session_date)
    .fetch_one(executor)
    .await
}

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) classroom_id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) session_date: Date,
    pub(crate) recorded_by: &'a str,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create_session(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSession<'_>,
) -> Result<AttendanceSession, sqlx::Error> {
    sqlx::query_as::<_, AttendanceSession>(&format!(
        "INSERT INTO attendance_sessions AS s (
            id, classroom_id, subject_id, session_date, recorded_by, created_at
         ) VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.classroom_id)
    .bind(params.subject_id)
    .bind(params.session_date)
    .bind(params.recorded_by)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

#[derive(Debug)]
pub(crate) struct NewRecord {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttendanceStatus,
}

pub(crate) async fn insert_records(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
    records: &[NewRecord],
    created_at: time::PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO attendance_records (id, session_id, student_id, status, created_at) ",
    );
    builder.push_values(records, |mut row, record| {
        row.push_bind(record.id.clone())
            .push_bind(session_id.to_string())
            .push_bind(record.student_id.clone())
            .push_bind(record.status)
            .push_bind(created_at);
    });

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Every record of the student, newest date first.
pub(crate) async fn history_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, HistoryRow>(
        "SELECT s.subject_id, s.session_date, r.status
         FROM attendance_records r
         JOIN attendance_sessions s ON s.id = r.session_id
         WHERE r.student_id = $1
         ORDER BY s.session_date DESC, s.subject_id",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn recent_for_student(
    pool: &PgPool,
    student_id: &str,
    limit: i64,
) -> Result<Vec<RecentAttendanceRow>, sqlx::Error> {
    sqlx::query_as::<_, RecentAttendanceRow>(
        "SELECT s.id AS session_id, s.subject_id, j.name AS subject_name,
                s.session_date, r.status
         FROM attendance_records r
         JOIN attendance_sessions s ON s.id = r.session_id
         JOIN subjects j ON j.id = s.subject_id
         WHERE r.student_id = $1
         ORDER BY s.session_date DESC, j.name, s.id
         LIMIT $2",
    )
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) struct SessionFilters<'a> {
    pub(crate) classroom_id: Option<&'a str>,
    pub(crate) subject_id: Option<&'a str>,
}

pub(crate) async fn list_sessions_scoped(
    pool: &PgPool,
    scope: &Scope<'_>,
    filters: &SessionFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<SessionSummaryRow>, i64), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SESSION_COLUMNS},
                COUNT(r.id) AS record_count,
                COUNT(r.id) FILTER (WHERE r.status = 'absent') AS absent_count
         FROM attendance_sessions s
         LEFT JOIN attendance_records r ON r.session_id = s.id
         WHERE TRUE"
    ));
    push_session_filters(&mut builder, scope, filters);
    builder.push(" GROUP BY s.id ORDER BY s.session_date DESC, s.created_at DESC, s.id OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    let items = builder.build_query_as::<SessionSummaryRow>().fetch_all(pool).await?;

    let mut count =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM attendance_sessions s WHERE TRUE");
    push_session_filters(&mut count, scope, filters);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((items, total))
}

fn push_session_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: &Scope<'_>,
    filters: &SessionFilters<'_>,
) {
    scope.push(builder, "s");
    if let Some(classroom_id) = filters.classroom_id {
        builder.push(" AND s.classroom_id = ");
        builder.push_bind(classroom_id.to_string());
    }
    if let Some(subject_id) = filters.subject_id {
        builder.push(" AND s.subject_id = ");
        builder.push_bind(subject_id.to_string());
    }
}
