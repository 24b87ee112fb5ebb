use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, today_utc};
use crate::db::models::Alert;
use crate::db::types::{AlertStatus, AlertType, RiskLevel, UserRole};
use crate::repositories;
use crate::repositories::alerts::{AlertChanges, AlertFilters};
use crate::services::errors::ServiceError;
use crate::services::policy::{Policy, QueryKind};

#[derive(Debug, Clone, Default)]
pub(crate) struct AlertPatch {
    pub(crate) status: Option<AlertStatus>,
    pub(crate) assigned_to: Option<String>,
    pub(crate) expected_version: Option<i32>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAlert {
    pub(crate) student_id: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) alert_type: AlertType,
    pub(crate) risk_level: RiskLevel,
}

/// Who may move an alert from `from` to `to`. `is_assignee` means the actor is the
/// form master the alert is assigned to.
pub(crate) fn check_transition(
    role: UserRole,
    is_assignee: bool,
    from: AlertStatus,
    to: AlertStatus,
) -> Result<(), ServiceError> {
    if from.is_terminal() {
        return Err(ServiceError::invariant(format!("Alert is {from} and can no longer change")));
    }
    if from == to {
        return Err(ServiceError::invariant(format!("Alert is already {to}")));
    }

    let assignee_or_admin =
        role == UserRole::Admin || (role == UserRole::FormMaster && is_assignee);

    match to {
        AlertStatus::Active => {
            Err(ServiceError::invariant(format!("Alert cannot return to active from {from}")))
        }
        AlertStatus::UnderReview => {
            if from != AlertStatus::Active {
                return Err(ServiceError::invariant(format!(
                    "Alert cannot move from {from} to {to}"
                )));
            }
            if assignee_or_admin {
                Ok(())
            } else {
                Err(ServiceError::forbidden("Only the assigned form master or an admin can review"))
            }
        }
        AlertStatus::Escalated => {
            if !matches!(from, AlertStatus::Active | AlertStatus::UnderReview) {
                return Err(ServiceError::invariant(format!(
                    "Alert cannot move from {from} to {to}"
                )));
            }
            if assignee_or_admin {
                Ok(())
            } else {
                Err(ServiceError::forbidden(
                    "Only the assigned form master or an admin can escalate",
                ))
            }
        }
        AlertStatus::Resolved | AlertStatus::Dismissed => {
            if role == UserRole::Admin {
                Ok(())
            } else {
                Err(ServiceError::forbidden(format!("Only an admin can mark an alert {to}")))
            }
        }
    }
}

pub(crate) async fn get_alert(
    state: &AppState,
    policy: &Policy,
    alert_id: &str,
) -> Result<Alert, ServiceError> {
    repositories::alerts::find_scoped(state.db(), alert_id, &policy.scope(QueryKind::Alerts))
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load alert"))?
        .ok_or_else(|| ServiceError::not_found("Alert not found"))
}

pub(crate) async fn list_alerts(
    state: &AppState,
    policy: &Policy,
    filters: AlertFilters<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Alert>, i64), ServiceError> {
    repositories::alerts::list_scoped(
        state.db(),
        &policy.scope(QueryKind::Alerts),
        &filters,
        skip,
        limit,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to list alerts"))
}

pub(crate) async fn update_alert(
    state: &AppState,
    policy: &Policy,
    alert_id: &str,
    patch: AlertPatch,
) -> Result<Alert, ServiceError> {
    if patch.status.is_none() && patch.assigned_to.is_none() {
        return Err(ServiceError::validation("Nothing to update"));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    let alert =
        repositories::alerts::find_scoped(&mut *tx, alert_id, &policy.scope(QueryKind::Alerts))
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load alert"))?
            .ok_or_else(|| ServiceError::not_found("Alert not found"))?;

    if let Some(expected) = patch.expected_version {
        if expected != alert.version {
            return Err(ServiceError::conflict(format!(
                "Alert was modified (expected version {expected}, found {})",
                alert.version
            )));
        }
    }

    let is_assignee = alert.assigned_to.as_deref() == Some(policy.user_id());
    let mut status = alert.status;
    let mut escalated_to_admin = alert.escalated_to_admin;
    let mut resolved_at = alert.resolved_at;
    let now = primitive_now_utc();

    if let Some(target) = patch.status {
        check_transition(policy.role(), is_assignee, alert.status, target)?;
        status = target;
        match target {
            AlertStatus::Escalated => escalated_to_admin = true,
            AlertStatus::Resolved | AlertStatus::Dismissed => resolved_at = Some(now),
            AlertStatus::Active | AlertStatus::UnderReview => {}
        }
    }

    let mut assigned_to = alert.assigned_to.clone();
    if let Some(assignee) = patch.assigned_to.as_deref() {
        policy.require_admin()?;
        if alert.status.is_terminal() {
            return Err(ServiceError::invariant("Closed alerts cannot be reassigned"));
        }
        require_active_form_master(&mut tx, assignee).await?;
        assigned_to = Some(assignee.to_string());
    }

    let updated = repositories::alerts::update_with_version(
        &mut *tx,
        &alert.id,
        alert.version,
        AlertChanges {
            status,
            assigned_to: assigned_to.as_deref(),
            escalated_to_admin,
            resolved_at,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to update alert"))?
    .ok_or_else(|| ServiceError::conflict("Alert was modified concurrently"))?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit alert update"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(
        alert_id = %updated.id,
        from = %alert.status,
        to = %updated.status,
        version = updated.version,
        actor_id = %policy.user_id(),
        "Alert updated"
    );
    Ok(updated)
}

pub(crate) async fn create_alert(
    state: &AppState,
    policy: &Policy,
    new_alert: NewAlert,
) -> Result<Alert, ServiceError> {
    policy.require_admin()?;

    match (new_alert.alert_type, new_alert.subject_id.as_deref()) {
        (AlertType::Attendance, None) => {
            return Err(ServiceError::validation("Attendance alerts require a subject"));
        }
        (AlertType::FullDayAbsence, Some(_)) => {
            return Err(ServiceError::validation("Full-day absence alerts have no subject"));
        }
        _ => {}
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    repositories::students::find_by_id(&mut *tx, &new_alert.student_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load student"))?
        .ok_or_else(|| ServiceError::not_found("Student not found"))?;
    if let Some(subject_id) = new_alert.subject_id.as_deref() {
        repositories::subjects::find_by_id(&mut *tx, subject_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load subject"))?
            .ok_or_else(|| ServiceError::not_found("Subject not found"))?;
    }

    let form_master =
        repositories::enrollments::find_form_master_for_student(&mut *tx, &new_alert.student_id)
            .await
            .map_err(|e| ServiceError::database(e, "Failed to resolve form master"))?;

    let alert = repositories::alerts::create(
        &mut *tx,
        repositories::alerts::CreateAlert {
            id: &Uuid::new_v4().to_string(),
            student_id: &new_alert.student_id,
            subject_id: new_alert.subject_id.as_deref(),
            alert_type: new_alert.alert_type,
            risk_level: new_alert.risk_level,
            assigned_to: form_master.as_deref(),
            alert_date: today_utc(),
            created_by: policy.user_id(),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        if crate::db::is_unique_violation(&e) {
            ServiceError::conflict("An active alert already exists for this student and subject")
        } else {
            ServiceError::database(e, "Failed to create alert")
        }
    })?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit alert"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(alert_id = %alert.id, student_id = %alert.student_id, "Alert created manually");
    Ok(alert)
}

pub(crate) async fn require_active_form_master(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
) -> Result<(), ServiceError> {
    repositories::users::find_active_with_role(&mut **tx, user_id, UserRole::FormMaster)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load assignee"))?
        .map(|_| ())
        .ok_or_else(|| ServiceError::validation("Assignee must be an active form master"))
}

#[cfg(test)]
mod tests {
    use super::check_transition;
    use crate::db::types::{AlertStatus, UserRole};

    #[test]
    fn terminal_states_never_change() {
        for from in [AlertStatus::Resolved, AlertStatus::Dismissed] {
            for to in AlertStatus::ALL {
                let err = check_transition(UserRole::Admin, true, from, to).unwrap_err();
                assert_eq!(err.kind(), "invariant_violation", "{from} -> {to}");
            }
        }
    }

    #[test]
    fn assigned_form_master_reviews_and_escalates() {
        let fm = UserRole::FormMaster;
        assert!(check_transition(fm, true, AlertStatus::Active, AlertStatus::UnderReview).is_ok());
        assert!(check_transition(fm, true, AlertStatus::Active, AlertStatus::Escalated).is_ok());
        assert!(
            check_transition(fm, true, AlertStatus::UnderReview, AlertStatus::Escalated).is_ok()
        );
        assert_eq!(
            check_transition(fm, false, AlertStatus::Active, AlertStatus::UnderReview)
                .unwrap_err()
                .kind(),
            "forbidden"
        );
    }

    #[test]
    fn only_admin_resolves_or_dismisses() {
        for to in [AlertStatus::Resolved, AlertStatus::Dismissed] {
            assert!(check_transition(UserRole::Admin, false, AlertStatus::Escalated, to).is_ok());
            assert_eq!(
                check_transition(UserRole::FormMaster, true, AlertStatus::Active, to)
                    .unwrap_err()
                    .kind(),
                "forbidden"
            );
        }
    }

    #[test]
    fn escalated_alerts_cannot_go_back_to_review() {
        let err =
            check_transition(UserRole::Admin, false, AlertStatus::Escalated, AlertStatus::UnderReview)
                .unwrap_err();
        assert_eq!(err.kind(), "invariant_violation");
        let err =
            check_transition(UserRole::Admin, false, AlertStatus::UnderReview, AlertStatus::Active)
                .unwrap_err();
        assert_eq!(err.kind(), "invariant_violation");
    }

    #[test]
    fn teachers_cannot_transition() {
        let err =
            check_transition(UserRole::Teacher, false, AlertStatus::Active, AlertStatus::UnderReview)
                .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
