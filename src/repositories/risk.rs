use sqlx::PgPool;

use crate::db::models::{StudentRiskProfile, SubjectRiskInsight};
use crate::db::types::RiskLevel;

/// Serialises risk recomputation per student until the transaction ends.
pub(crate) async fn lock_student(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(student_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub(crate) async fn upsert_profile(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
    risk_score: f64,
    risk_level: RiskLevel,
    calculated_at: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_risk_profiles (student_id, risk_score, risk_level, last_calculated)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (student_id) DO UPDATE
         SET risk_score = EXCLUDED.risk_score,
             risk_level = EXCLUDED.risk_level,
             last_calculated = EXCLUDED.last_calculated",
    )
    .bind(student_id)
    .bind(risk_score)
    .bind(risk_level)
    .bind(calculated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) struct InsightCounters<'a> {
    pub(crate) student_id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) total_sessions: i32,
    pub(crate) absence_count: i32,
    pub(crate) late_count: i32,
    pub(crate) absence_rate: f64,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn upsert_insight(
    executor: impl sqlx::PgExecutor<'_>,
    params: InsightCounters<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO subject_risk_insights (
            student_id, subject_id, total_sessions, absence_count, late_count,
            absence_rate, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7)
         ON CONFLICT (student_id, subject_id) DO UPDATE
         SET total_sessions = EXCLUDED.total_sessions,
             absence_count = EXCLUDED.absence_count,
             late_count = EXCLUDED.late_count,
             absence_rate = EXCLUDED.absence_rate,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(params.student_id)
    .bind(params.subject_id)
    .bind(params.total_sessions)
    .bind(params.absence_count)
    .bind(params.late_count)
    .bind(params.absence_rate)
    .bind(params.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_profile(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
) -> Result<Option<StudentRiskProfile>, sqlx::Error> {
    sqlx::query_as::<_, StudentRiskProfile>(
        "SELECT student_id, risk_score, risk_level, last_calculated
         FROM student_risk_profiles WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn insights_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<SubjectRiskInsight>, sqlx::Error> {
    sqlx::query_as::<_, SubjectRiskInsight>(
        "SELECT student_id, subject_id, total_sessions, absence_count, late_count,
                absence_rate, updated_at
         FROM subject_risk_insights
         WHERE student_id = $1
         ORDER BY absence_rate DESC, subject_id",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub(crate) async fn find_insight(
    pool: &PgPool,
    student_id: &str,
    subject_id: &str,
) -> Result<Option<SubjectRiskInsight>, sqlx::Error> {
    sqlx::query_as::<_, SubjectRiskInsight>(
        "SELECT student_id, subject_id, total_sessions, absence_count, late_count,
                absence_rate, updated_at
         FROM subject_risk_insights
         WHERE student_id = $1 AND subject_id = $2",
    )
    .bind(student_id)
    .bind(subject_id)
    .fetch_optional(pool)
    .await
}
