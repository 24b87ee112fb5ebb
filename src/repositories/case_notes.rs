use sqlx::PgPool;
use time::{Date, PrimitiveDateTime};

use crate::db::models::{InterventionMeeting, ProgressUpdate};
use crate::db::types::ProgressStatus;

pub(crate) async fn insert_meeting(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    case_id: &str,
    meeting_date: Date,
    notes: &str,
    recorded_by: &str,
    created_at: PrimitiveDateTime,
) -> Result<InterventionMeeting, sqlx::Error> {
    sqlx::query_as::<_, InterventionMeeting>(
        "INSERT INTO intervention_meetings (id, case_id, meeting_date, notes, recorded_by, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING id, case_id, meeting_date, notes, recorded_by, created_at",
    )
    .bind(id)
    .bind(case_id)
    .bind(meeting_date)
    .bind(notes)
    .bind(recorded_by)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn insert_progress_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    case_id: &str,
    note: &str,
    progress_status: Option<ProgressStatus>,
    recorded_by: &str,
    created_at: PrimitiveDateTime,
) -> Result<ProgressUpdate, sqlx::Error> {
    sqlx::query_as::<_, ProgressUpdate>(
        "INSERT INTO progress_updates (id, case_id, note, progress_status, recorded_by, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING id, case_id, note, progress_status, recorded_by, created_at",
    )
    .bind(id)
    .bind(case_id)
    .bind(note)
    .bind(progress_status)
    .bind(recorded_by)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_meetings(
    pool: &PgPool,
    case_id: &str,
) -> Result<Vec<InterventionMeeting>, sqlx::Error> {
    sqlx::query_as::<_, InterventionMeeting>(
        "SELECT id, case_id, meeting_date, notes, recorded_by, created_at
         FROM intervention_meetings WHERE case_id = $1
         ORDER BY created_at, id",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_progress_updates(
    pool: &PgPool,
    case_id: &str,
) -> Result<Vec<ProgressUpdate>, sqlx::Error> {
    sqlx::query_as::<_, ProgressUpdate>(
        "SELECT id, case_id, note, progress_status, recorded_by, created_at
         FROM progress_updates WHERE case_id = $1
         ORDER BY created_at, id",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await
}
