pub(crate) mod scoring;

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::core::config::RiskSettings;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Alert, AttendanceSession};
use crate::db::types::AlertType;
use crate::repositories;
use crate::services::errors::ServiceError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RiskOutcome {
    pub(crate) students: usize,
    pub(crate) alerts_created: usize,
    pub(crate) alerts_refreshed: usize,
    pub(crate) cases_created: usize,
}

/// Recomputes insights, profile and alerts for every student of a freshly stored session.
///
/// Runs inside the ingestion transaction. Student locks are taken in ascending id
/// order so overlapping sessions cannot deadlock; they are released on commit or rollback.
pub(crate) async fn update_risk_after_session(
    tx: &mut Transaction<'_, Postgres>,
    settings: &RiskSettings,
    session: &AttendanceSession,
    form_master_id: Option<&str>,
    student_ids: &[String],
) -> Result<RiskOutcome, ServiceError> {
    let mut ordered: Vec<&String> = student_ids.iter().collect();
    ordered.sort();
    ordered.dedup();

    for student_id in &ordered {
        repositories::risk::lock_student(tx, student_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to acquire student risk lock"))?;
    }

    let mut outcome = RiskOutcome::default();
    let now = primitive_now_utc();

    for student_id in ordered {
        let history = repositories::attendance::history_for_student(&mut **tx, student_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load attendance history"))?;
        let assessment = scoring::assess(&history, settings);

        repositories::risk::upsert_profile(
            &mut **tx,
            student_id,
            assessment.score,
            assessment.level,
            now,
        )
        .await
        .map_err(|e| ServiceError::database(e, "Failed to store risk profile"))?;

        for (subject_id, stats) in &assessment.subjects {
            repositories::risk::upsert_insight(
                &mut **tx,
                repositories::risk::InsightCounters {
                    student_id,
                    subject_id,
                    total_sessions: stats.total_sessions,
                    absence_count: stats.absence_count,
                    late_count: stats.late_count,
                    absence_rate: stats.absence_rate,
                    updated_at: now,
                },
            )
            .await
            .map_err(|e| ServiceError::database(e, "Failed to store subject insight"))?;
        }

        let subject_alert = assessment
            .subject(&session.subject_id)
            .is_some_and(|stats| scoring::needs_subject_alert(stats, settings));
        if subject_alert {
            let alert = ensure_active_alert(
                tx,
                session,
                student_id,
                Some(&session.subject_id),
                AlertType::Attendance,
                assessment.level,
                form_master_id,
                &mut outcome,
            )
            .await?;
            open_case_if_needed(tx, &alert, form_master_id, &mut outcome).await?;
        }

        if scoring::needs_full_day_alert(&assessment, settings) {
            let alert = ensure_active_alert(
                tx,
                session,
                student_id,
                None,
                AlertType::FullDayAbsence,
                assessment.level,
                form_master_id,
                &mut outcome,
            )
            .await?;
            open_case_if_needed(tx, &alert, form_master_id, &mut outcome).await?;
        }

        tracing::debug!(
            student_id = %student_id,
            score = assessment.score,
            level = assessment.level.as_str(),
            full_day_streak = assessment.full_day_streak,
            "Risk profile recalculated"
        );
        outcome.students += 1;
    }

    metrics::risk_recalculated(outcome.students);
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
async fn ensure_active_alert(
    tx: &mut Transaction<'_, Postgres>,
    session: &AttendanceSession,
    student_id: &str,
    subject_id: Option<&str>,
    alert_type: AlertType,
    level: crate::db::types::RiskLevel,
    form_master_id: Option<&str>,
    outcome: &mut RiskOutcome,
) -> Result<Alert, ServiceError> {
    let upserted = repositories::alerts::upsert_active(
        &mut **tx,
        repositories::alerts::UpsertActive {
            id: &Uuid::new_v4().to_string(),
            student_id,
            subject_id,
            alert_type,
            risk_level: level,
            assigned_to: form_master_id,
            alert_date: session.session_date,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to upsert alert"))?;

    metrics::alert_upserted(alert_type.as_str(), upserted.inserted);
    if upserted.inserted {
        outcome.alerts_created += 1;
        tracing::info!(
            alert_id = %upserted.alert.id,
            student_id = %student_id,
            alert_type = alert_type.as_str(),
            risk_level = level.as_str(),
            "Alert opened"
        );
    } else {
        outcome.alerts_refreshed += 1;
    }

    Ok(upserted.alert)
}

async fn open_case_if_needed(
    tx: &mut Transaction<'_, Postgres>,
    alert: &Alert,
    form_master_id: Option<&str>,
    outcome: &mut RiskOutcome,
) -> Result<(), ServiceError> {
    let Some(form_master_id) = form_master_id else {
        return Ok(());
    };
    if !alert.risk_level.requires_case() {
        return Ok(());
    }

    let already_open =
        repositories::cases::has_open_for_alert(&mut **tx, &alert.student_id, &alert.id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to check open cases"))?;
    if already_open {
        return Ok(());
    }

    let case = repositories::cases::create(
        &mut **tx,
        repositories::cases::CreateCase {
            id: &Uuid::new_v4().to_string(),
            student_id: &alert.student_id,
            alert_id: Some(&alert.id),
            assigned_to: form_master_id,
            created_by: None,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to open intervention case"))?;

    metrics::case_auto_created();
    outcome.cases_created += 1;
    tracing::info!(
        case_id = %case.id,
        alert_id = %alert.id,
        assigned_to = %form_master_id,
        "Intervention case opened automatically"
    );
    Ok(())
}
