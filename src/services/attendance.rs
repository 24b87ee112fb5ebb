use std::collections::BTreeSet;
use std::str::FromStr;

use time::Date;
use uuid::Uuid;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, today_utc};
use crate::db::models::AttendanceSession;
use crate::db::types::{AttendanceStatus, UserRole};
use crate::repositories;
use crate::repositories::attendance::{NewRecord, SessionFilters, SessionSummaryRow};
use crate::services::errors::ServiceError;
use crate::services::policy::{Policy, QueryKind};
use crate::services::risk::{self, RiskOutcome};

#[derive(Debug, Clone)]
pub(crate) struct RecordEntry {
    pub(crate) student_id: String,
    pub(crate) status: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordSession {
    pub(crate) classroom_id: String,
    pub(crate) subject_id: String,
    pub(crate) session_date: Date,
    pub(crate) records: Vec<RecordEntry>,
}

#[derive(Debug)]
pub(crate) struct RecordedSession {
    pub(crate) session: AttendanceSession,
    pub(crate) record_count: usize,
    pub(crate) risk: RiskOutcome,
}

/// Checks the payload on its own: no duplicate students, every status known.
pub(crate) fn parse_records(entries: &[RecordEntry]) -> Result<Vec<NewRecord>, ServiceError> {
    let mut seen = BTreeSet::new();
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        if !seen.insert(entry.student_id.as_str()) {
            return Err(ServiceError::validation(format!(
                "Student {} appears more than once",
                entry.student_id
            )));
        }
        let status = AttendanceStatus::from_str(&entry.status).map_err(ServiceError::Validation)?;
        records.push(NewRecord {
            id: Uuid::new_v4().to_string(),
            student_id: entry.student_id.clone(),
            status,
        });
    }

    Ok(records)
}

/// The submitted student set must equal the active roster exactly.
pub(crate) fn check_roster(
    records: &[NewRecord],
    roster: &[String],
) -> Result<(), ServiceError> {
    if roster.is_empty() {
        return Err(ServiceError::invariant("Classroom has no actively enrolled students"));
    }

    let submitted: BTreeSet<&str> = records.iter().map(|record| record.student_id.as_str()).collect();
    let expected: BTreeSet<&str> = roster.iter().map(String::as_str).collect();

    let missing = expected.difference(&submitted).count();
    let unexpected = submitted.difference(&expected).count();
    if missing > 0 || unexpected > 0 {
        return Err(ServiceError::invariant(format!(
            "Attendance must cover every enrolled student exactly once \
             ({missing} missing, {unexpected} not enrolled)"
        )));
    }
    Ok(())
}

pub(crate) async fn record_session(
    state: &AppState,
    policy: &Policy,
    command: RecordSession,
) -> Result<RecordedSession, ServiceError> {
    policy.require_role(UserRole::Teacher, "Only teachers can record attendance")?;

    let classroom = repositories::classrooms::find_by_id(state.db(), &command.classroom_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load classroom"))?
        .ok_or_else(|| ServiceError::not_found("Classroom not found"))?;
    repositories::subjects::find_by_id(state.db(), &command.subject_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load subject"))?
        .ok_or_else(|| ServiceError::not_found("Subject not found"))?;
    if !classroom.is_active {
        return Err(ServiceError::invariant("Classroom is not active"));
    }

    let assigned = repositories::subjects::has_active_assignment(
        state.db(),
        policy.user_id(),
        &command.subject_id,
        &classroom.id,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to check teaching assignment"))?;
    if !assigned {
        return Err(ServiceError::forbidden("Not assigned to teach this subject in this classroom"));
    }

    if !state.settings().attendance().allow_future_dates && command.session_date > today_utc() {
        return Err(ServiceError::validation("Attendance cannot be recorded for a future date"));
    }

    let records = parse_records(&command.records)?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    let exists = repositories::attendance::session_exists(
        &mut *tx,
        &classroom.id,
        &command.subject_id,
        command.session_date,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to check existing session"))?;
    if exists {
        return Err(ServiceError::conflict("Attendance already recorded for this session"));
    }

    let roster = repositories::enrollments::active_student_ids(
        &mut *tx,
        &classroom.id,
        &classroom.academic_year,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to load class roster"))?;
    check_roster(&records, &roster)?;

    let now = primitive_now_utc();
    let session = repositories::attendance::create_session(
        &mut *tx,
        repositories::attendance::CreateSession {
            id: &Uuid::new_v4().to_string(),
            classroom_id: &classroom.id,
            subject_id: &command.subject_id,
            session_date: command.session_date,
            recorded_by: policy.user_id(),
            created_at: now,
        },
    )
    .await
    .map_err(|e| {
        if crate::db::is_unique_violation(&e) {
            ServiceError::conflict("Attendance already recorded for this session")
        } else {
            ServiceError::database(e, "Failed to create attendance session")
        }
    })?;

    repositories::attendance::insert_records(&mut *tx, &session.id, &records, now)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to store attendance records"))?;

    let risk = risk::update_risk_after_session(
        &mut tx,
        state.settings().risk(),
        &session,
        classroom.form_master_id.as_deref(),
        &roster,
    )
    .await?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit attendance"))?;

    metrics::session_recorded();
    state.dashboard_cache().invalidate().await;
    tracing::info!(
        session_id = %session.id,
        classroom_id = %session.classroom_id,
        subject_id = %session.subject_id,
        records = records.len(),
        alerts_created = risk.alerts_created,
        cases_created = risk.cases_created,
        "Attendance session recorded"
    );

    Ok(RecordedSession { session, record_count: records.len(), risk })
}

pub(crate) async fn list_sessions(
    state: &AppState,
    policy: &Policy,
    filters: SessionFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<SessionSummaryRow>, i64), ServiceError> {
    repositories::attendance::list_sessions_scoped(
        state.db(),
        &policy.scope(QueryKind::Sessions),
        &filters,
        skip,
        limit,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to list attendance sessions"))
}
