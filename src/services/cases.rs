use sqlx::{Postgres, Transaction};
use time::Date;
use uuid::Uuid;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{InterventionCase, InterventionMeeting, ProgressUpdate};
use crate::db::types::{AlertStatus, CaseStatus, ProgressStatus, UserRole};
use crate::repositories;
use crate::repositories::alerts::AlertChanges;
use crate::repositories::cases::{CaseChanges, CaseFilters};
use crate::services::alerts::require_active_form_master;
use crate::services::errors::ServiceError;
use crate::services::policy::{Policy, QueryKind};

/// Requested changes. Outer `None` leaves a field as stored.
#[derive(Debug, Clone, Default)]
pub(crate) struct CasePatch {
    pub(crate) expected_version: i32,
    pub(crate) status: Option<CaseStatus>,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) meeting_date: Option<Date>,
    pub(crate) meeting_notes: Option<String>,
    pub(crate) follow_up_date: Option<Date>,
    pub(crate) escalation_reason: Option<String>,
    pub(crate) resolution_notes: Option<String>,
    pub(crate) assigned_to: Option<String>,
}

impl CasePatch {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress_status.is_none()
            && self.meeting_date.is_none()
            && self.meeting_notes.is_none()
            && self.follow_up_date.is_none()
            && self.escalation_reason.is_none()
            && self.resolution_notes.is_none()
            && self.assigned_to.is_none()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewCase {
    pub(crate) student_id: String,
    pub(crate) alert_id: Option<String>,
    pub(crate) assigned_to: String,
}

#[derive(Debug)]
pub(crate) struct CaseDetail {
    pub(crate) case: InterventionCase,
    pub(crate) meetings: Vec<InterventionMeeting>,
    pub(crate) progress_updates: Vec<ProgressUpdate>,
}

/// Values a transition may depend on, after the patch is merged over the stored row.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TransitionInputs {
    pub(crate) has_meeting_date: bool,
    pub(crate) has_escalation_reason: bool,
    pub(crate) has_resolution_notes: bool,
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}

pub(crate) fn check_transition(
    role: UserRole,
    is_assignee: bool,
    from: CaseStatus,
    to: CaseStatus,
    inputs: TransitionInputs,
) -> Result<(), ServiceError> {
    if from == CaseStatus::Closed {
        return Err(ServiceError::invariant("Closed cases cannot be modified"));
    }
    if from == to {
        return Err(ServiceError::invariant(format!("Case is already {to}")));
    }

    let assignee = role == UserRole::FormMaster && is_assignee;

    let allowed = matches!(
        (from, to),
        (CaseStatus::Open, CaseStatus::InProgress)
            | (CaseStatus::InProgress, CaseStatus::AwaitingParent)
            | (CaseStatus::AwaitingParent, CaseStatus::InProgress)
            | (_, CaseStatus::EscalatedToAdmin)
            | (_, CaseStatus::Closed)
    );
    if !allowed {
        return Err(ServiceError::invariant(format!("Case cannot move from {from} to {to}")));
    }

    match to {
        CaseStatus::Closed => {
            if !(assignee || role == UserRole::Admin) {
                return Err(ServiceError::forbidden(
                    "Only the assigned form master or an admin can close a case",
                ));
            }
            if !inputs.has_resolution_notes {
                return Err(ServiceError::validation("resolution_notes are required to close"));
            }
        }
        CaseStatus::EscalatedToAdmin => {
            if !assignee {
                return Err(ServiceError::forbidden("Only the assigned form master can escalate"));
            }
            if !inputs.has_escalation_reason {
                return Err(ServiceError::validation("escalation_reason is required to escalate"));
            }
        }
        CaseStatus::InProgress | CaseStatus::AwaitingParent => {
            if !assignee {
                return Err(ServiceError::forbidden(
                    "Only the assigned form master can progress a case",
                ));
            }
            if from == CaseStatus::Open && !inputs.has_meeting_date {
                return Err(ServiceError::validation("meeting_date is required to start a case"));
            }
        }
        CaseStatus::Open => {}
    }

    Ok(())
}

pub(crate) async fn get_case(
    state: &AppState,
    policy: &Policy,
    case_id: &str,
) -> Result<CaseDetail, ServiceError> {
    let case =
        repositories::cases::find_scoped(state.db(), case_id, &policy.scope(QueryKind::Cases))
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load case"))?
            .ok_or_else(|| ServiceError::not_found("Case not found"))?;

    let meetings = repositories::case_notes::list_meetings(state.db(), &case.id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load meetings"))?;
    let progress_updates = repositories::case_notes::list_progress_updates(state.db(), &case.id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load progress updates"))?;

    Ok(CaseDetail { case, meetings, progress_updates })
}

pub(crate) async fn list_cases(
    state: &AppState,
    policy: &Policy,
    filters: CaseFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<InterventionCase>, i64), ServiceError> {
    repositories::cases::list_scoped(
        state.db(),
        &policy.scope(QueryKind::Cases),
        &filters,
        skip,
        limit,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to list cases"))
}

pub(crate) async fn update_case(
    state: &AppState,
    policy: &Policy,
    case_id: &str,
    patch: CasePatch,
) -> Result<InterventionCase, ServiceError> {
    if patch.is_empty() {
        return Err(ServiceError::validation("Nothing to update"));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    let case = repositories::cases::find_scoped(&mut *tx, case_id, &policy.scope(QueryKind::Cases))
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load case"))?
        .ok_or_else(|| ServiceError::not_found("Case not found"))?;

    if case.status == CaseStatus::Closed {
        return Err(ServiceError::invariant("Closed cases cannot be modified"));
    }

    let is_assignee = case.assigned_to == policy.user_id();
    if !(policy.is_admin() || (policy.role() == UserRole::FormMaster && is_assignee)) {
        return Err(ServiceError::forbidden("Only the assigned form master or an admin can update"));
    }
    // The patch is merged over this row, so it must be the version the caller saw.
    if patch.expected_version != case.version {
        return Err(ServiceError::conflict(format!(
            "Case was modified (expected version {}, found {})",
            patch.expected_version, case.version
        )));
    }

    let meeting_date = patch.meeting_date.or(case.meeting_date);
    let meeting_notes = patch.meeting_notes.clone().or_else(|| case.meeting_notes.clone());
    let escalation_reason =
        patch.escalation_reason.clone().or_else(|| case.escalation_reason.clone());
    let resolution_notes = patch.resolution_notes.clone().or_else(|| case.resolution_notes.clone());

    let mut status = case.status;
    let mut closed_at = case.closed_at;
    let now = primitive_now_utc();

    if let Some(target) = patch.status {
        check_transition(
            policy.role(),
            is_assignee,
            case.status,
            target,
            TransitionInputs {
                has_meeting_date: meeting_date.is_some(),
                has_escalation_reason: filled(escalation_reason.as_deref()),
                has_resolution_notes: filled(resolution_notes.as_deref()),
            },
        )?;
        status = target;
        if target == CaseStatus::Closed {
            closed_at = Some(now);
        }
    }

    let mut assigned_to = case.assigned_to.clone();
    if let Some(assignee) = patch.assigned_to.as_deref() {
        policy.require_admin()?;
        require_active_form_master(&mut tx, assignee).await?;
        assigned_to = assignee.to_string();
    }

    // Lock the alert before touching the case so concurrent closures serialise on it.
    let closing_alert = match (status, case.alert_id.as_deref()) {
        (CaseStatus::Closed, Some(alert_id)) => repositories::alerts::lock_for_update(&mut tx, alert_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to lock alert"))?,
        _ => None,
    };

    let updated = repositories::cases::update_with_version(
        &mut *tx,
        &case.id,
        patch.expected_version,
        CaseChanges {
            status,
            assigned_to: &assigned_to,
            progress_status: patch.progress_status.or(case.progress_status),
            meeting_date,
            meeting_notes: meeting_notes.as_deref(),
            follow_up_date: patch.follow_up_date.or(case.follow_up_date),
            escalation_reason: escalation_reason.as_deref(),
            resolution_notes: resolution_notes.as_deref(),
            closed_at,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to update case"))?;

    let Some(updated) = updated else {
        let still_there = repositories::cases::exists(&mut *tx, &case.id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to check case"))?;
        return Err(if still_there {
            ServiceError::conflict(format!(
                "Case was modified (expected version {})",
                patch.expected_version
            ))
        } else {
            ServiceError::not_found("Case not found")
        });
    };

    if let Some(alert) = closing_alert {
        resolve_alert_if_last(&mut tx, &alert).await?;
    }

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit case update"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(
        case_id = %updated.id,
        from = %case.status,
        to = %updated.status,
        version = updated.version,
        actor_id = %policy.user_id(),
        "Case updated"
    );
    Ok(updated)
}

async fn resolve_alert_if_last(
    tx: &mut Transaction<'_, Postgres>,
    alert: &crate::db::models::Alert,
) -> Result<(), ServiceError> {
    if alert.status.is_terminal() {
        return Ok(());
    }

    let open = repositories::cases::count_open_for_alert(&mut **tx, &alert.id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to count open cases"))?;
    if open > 0 {
        return Ok(());
    }

    let now = primitive_now_utc();
    repositories::alerts::update_with_version(
        &mut **tx,
        &alert.id,
        alert.version,
        AlertChanges {
            status: AlertStatus::Resolved,
            assigned_to: alert.assigned_to.as_deref(),
            escalated_to_admin: alert.escalated_to_admin,
            resolved_at: Some(now),
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to resolve alert"))?
    .ok_or_else(|| ServiceError::conflict("Alert was modified concurrently"))?;

    metrics::alert_auto_resolved();
    tracing::info!(alert_id = %alert.id, "Alert resolved after its last case closed");
    Ok(())
}

pub(crate) async fn create_case(
    state: &AppState,
    policy: &Policy,
    new_case: NewCase,
) -> Result<InterventionCase, ServiceError> {
    policy.require_admin()?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    repositories::students::find_by_id(&mut *tx, &new_case.student_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load student"))?
        .ok_or_else(|| ServiceError::not_found("Student not found"))?;
    require_active_form_master(&mut tx, &new_case.assigned_to).await?;

    if let Some(alert_id) = new_case.alert_id.as_deref() {
        let alert = repositories::alerts::find_by_id(&mut *tx, alert_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load alert"))?
            .ok_or_else(|| ServiceError::not_found("Alert not found"))?;
        if alert.student_id != new_case.student_id {
            return Err(ServiceError::validation("Alert belongs to a different student"));
        }
        if alert.status.is_terminal() {
            return Err(ServiceError::invariant("Cannot open a case for a closed alert"));
        }
    }

    let case = repositories::cases::create(
        &mut *tx,
        repositories::cases::CreateCase {
            id: &Uuid::new_v4().to_string(),
            student_id: &new_case.student_id,
            alert_id: new_case.alert_id.as_deref(),
            assigned_to: &new_case.assigned_to,
            created_by: Some(policy.user_id()),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to create case"))?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit case"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(case_id = %case.id, assigned_to = %case.assigned_to, "Case created manually");
    Ok(case)
}

/// Loads a case the actor may append notes to.
async fn writable_case(
    tx: &mut Transaction<'_, Postgres>,
    policy: &Policy,
    case_id: &str,
) -> Result<InterventionCase, ServiceError> {
    let case = repositories::cases::find_scoped(&mut **tx, case_id, &policy.scope(QueryKind::Cases))
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load case"))?
        .ok_or_else(|| ServiceError::not_found("Case not found"))?;

    if !(policy.is_admin() || case.assigned_to == policy.user_id()) {
        return Err(ServiceError::forbidden("Only the assigned form master or an admin can add notes"));
    }
    if case.status == CaseStatus::Closed {
        return Err(ServiceError::invariant("Closed cases cannot be modified"));
    }
    Ok(case)
}

pub(crate) async fn add_meeting(
    state: &AppState,
    policy: &Policy,
    case_id: &str,
    meeting_date: Date,
    notes: &str,
) -> Result<InterventionMeeting, ServiceError> {
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;
    let case = writable_case(&mut tx, policy, case_id).await?;

    let meeting = repositories::case_notes::insert_meeting(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &case.id,
        meeting_date,
        notes,
        policy.user_id(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to record meeting"))?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit meeting"))?;
    tracing::info!(case_id = %case.id, meeting_id = %meeting.id, "Case meeting recorded");
    Ok(meeting)
}

pub(crate) async fn add_progress_update(
    state: &AppState,
    policy: &Policy,
    case_id: &str,
    note: &str,
    progress_status: Option<ProgressStatus>,
) -> Result<ProgressUpdate, ServiceError> {
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;
    let case = writable_case(&mut tx, policy, case_id).await?;

    let update = repositories::case_notes::insert_progress_update(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &case.id,
        note,
        progress_status,
        policy.user_id(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to record progress update"))?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit progress update"))?;
    tracing::info!(case_id = %case.id, update_id = %update.id, "Case progress recorded");
    Ok(update)
}
