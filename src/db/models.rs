use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, PrimitiveDateTime};

use crate::db::types::{
    AlertStatus, AlertType, AttendanceStatus, CaseStatus, ProgressStatus, RiskLevel, UserRole,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Classroom {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) academic_year: String,
    pub(crate) form_master_id: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Student {
    pub(crate) id: String,
    pub(crate) admission_number: String,
    pub(crate) full_name: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Enrollment {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) classroom_id: String,
    pub(crate) academic_year: String,
    pub(crate) is_active: bool,
    pub(crate) enrolled_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Subject {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TeachingAssignment {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) subject_id: String,
    pub(crate) classroom_id: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttendanceSession {
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) subject_id: String,
    pub(crate) session_date: Date,
    pub(crate) recorded_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttendanceRecord {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttendanceStatus,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentRiskProfile {
    pub(crate) student_id: String,
    pub(crate) risk_score: f64,
    pub(crate) risk_level: RiskLevel,
    pub(crate) last_calculated: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SubjectRiskInsight {
    pub(crate) student_id: String,
    pub(crate) subject_id: String,
    pub(crate) total_sessions: i32,
    pub(crate) absence_count: i32,
    pub(crate) late_count: i32,
    pub(crate) absence_rate: f64,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Alert {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) alert_type: AlertType,
    pub(crate) status: AlertStatus,
    pub(crate) risk_level: RiskLevel,
    pub(crate) assigned_to: Option<String>,
    pub(crate) escalated_to_admin: bool,
    pub(crate) alert_date: Date,
    pub(crate) created_by: Option<String>,
    pub(crate) version: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) resolved_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct InterventionCase {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) alert_id: Option<String>,
    pub(crate) assigned_to: String,
    pub(crate) created_by: Option<String>,
    pub(crate) status: CaseStatus,
    pub(crate) version: i32,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) meeting_date: Option<Date>,
    pub(crate) meeting_notes: Option<String>,
    pub(crate) follow_up_date: Option<Date>,
    pub(crate) escalation_reason: Option<String>,
    pub(crate) resolution_notes: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) closed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct InterventionMeeting {
    pub(crate) id: String,
    pub(crate) case_id: String,
    pub(crate) meeting_date: Date,
    pub(crate) notes: String,
    pub(crate) recorded_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ProgressUpdate {
    pub(crate) id: String,
    pub(crate) case_id: String,
    pub(crate) note: String,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) recorded_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}
