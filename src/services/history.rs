use crate::core::state::AppState;
use crate::db::models::{Alert, InterventionCase, Student, StudentRiskProfile, SubjectRiskInsight};
use crate::repositories;
use crate::repositories::alerts::AlertFilters;
use crate::repositories::attendance::RecentAttendanceRow;
use crate::repositories::cases::CaseFilters;
use crate::services::errors::ServiceError;
use crate::services::policy::{Policy, QueryKind};

const HISTORY_ITEM_LIMIT: i64 = 100;

#[derive(Debug)]
pub(crate) struct StudentHistory {
    pub(crate) student: Student,
    pub(crate) profile: Option<StudentRiskProfile>,
    pub(crate) insights: Vec<SubjectRiskInsight>,
    pub(crate) recent_attendance: Vec<RecentAttendanceRow>,
    pub(crate) alerts: Vec<Alert>,
    pub(crate) cases: Vec<InterventionCase>,
}

/// Everything the actor may see about one student. Alerts and cases pass through
/// their own scopes, so a teacher gets subject alerts only and never cases.
pub(crate) async fn get_student_history(
    state: &AppState,
    policy: &Policy,
    student_id: &str,
) -> Result<StudentHistory, ServiceError> {
    let pool = state.db();
    let student =
        repositories::students::find_scoped(pool, student_id, &policy.scope(QueryKind::Students))
            .await
            .map_err(|e| ServiceError::database(e, "Failed to load student"))?
            .ok_or_else(|| ServiceError::not_found("Student not found"))?;

    let recent_limit = state.settings().attendance().history_recent_limit;
    let alert_filters = AlertFilters { student_id: Some(&student.id), ..AlertFilters::default() };
    let case_filters = CaseFilters { student_id: Some(&student.id), ..CaseFilters::default() };
    let alert_scope = policy.scope(QueryKind::Alerts);
    let case_scope = policy.scope(QueryKind::Cases);

    let (profile, insights, recent_attendance, (alerts, _), (cases, _)) = tokio::try_join!(
        repositories::risk::find_profile(pool, &student.id),
        repositories::risk::insights_for_student(pool, &student.id),
        repositories::attendance::recent_for_student(pool, &student.id, recent_limit),
        repositories::alerts::list_scoped(pool, &alert_scope, &alert_filters, 0, HISTORY_ITEM_LIMIT),
        repositories::cases::list_scoped(pool, &case_scope, &case_filters, 0, HISTORY_ITEM_LIMIT),
    )
    .map_err(|e| ServiceError::database(e, "Failed to load student history"))?;

    Ok(StudentHistory { student, profile, insights, recent_attendance, alerts, cases })
}
