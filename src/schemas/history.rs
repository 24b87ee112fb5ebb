use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{StudentRiskProfile, SubjectRiskInsight};
use crate::db::types::RiskLevel;
use crate::schemas::alert::AlertResponse;
use crate::schemas::attendance::AttendanceEntryResponse;
use crate::schemas::case::CaseResponse;
use crate::schemas::roster::StudentResponse;
use crate::services::history::StudentHistory;

#[derive(Debug, Serialize)]
pub(crate) struct RiskProfileResponse {
    pub(crate) risk_score: f64,
    pub(crate) risk_level: RiskLevel,
    pub(crate) last_calculated: String,
}

impl RiskProfileResponse {
    fn from_db(profile: StudentRiskProfile) -> Self {
        Self {
            risk_score: profile.risk_score,
            risk_level: profile.risk_level,
            last_calculated: format_primitive(profile.last_calculated),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectInsightResponse {
    pub(crate) subject_id: String,
    pub(crate) total_sessions: i32,
    pub(crate) absence_count: i32,
    pub(crate) late_count: i32,
    pub(crate) absence_rate: f64,
}

impl SubjectInsightResponse {
    fn from_db(insight: SubjectRiskInsight) -> Self {
        Self {
            subject_id: insight.subject_id,
            total_sessions: insight.total_sessions,
            absence_count: insight.absence_count,
            late_count: insight.late_count,
            absence_rate: insight.absence_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentHistoryResponse {
    pub(crate) student: StudentResponse,
    pub(crate) risk_profile: Option<RiskProfileResponse>,
    pub(crate) subject_insights: Vec<SubjectInsightResponse>,
    pub(crate) recent_attendance: Vec<AttendanceEntryResponse>,
    pub(crate) alerts: Vec<AlertResponse>,
    pub(crate) cases: Vec<CaseResponse>,
}

impl StudentHistoryResponse {
    pub(crate) fn from_service(history: StudentHistory) -> Self {
        Self {
            student: StudentResponse::from_db(history.student),
            risk_profile: history.profile.map(RiskProfileResponse::from_db),
            subject_insights: history
                .insights
                .into_iter()
                .map(SubjectInsightResponse::from_db)
                .collect(),
            recent_attendance: history
                .recent_attendance
                .into_iter()
                .map(AttendanceEntryResponse::from_row)
                .collect(),
            alerts: history.alerts.into_iter().map(AlertResponse::from_db).collect(),
            cases: history.cases.into_iter().map(CaseResponse::from_db).collect(),
        }
    }
}
