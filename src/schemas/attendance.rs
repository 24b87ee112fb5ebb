use serde::{Deserialize, Serialize};
use time::Date;
use validator::Validate;

use crate::core::time::{format_date, format_primitive};
use crate::db::models::AttendanceSession;
use crate::repositories::attendance::{RecentAttendanceRow, SessionSummaryRow};
use crate::services::attendance::{RecordEntry, RecordSession, RecordedSession};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttendanceRecordIn {
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    pub(crate) status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttendanceSessionCreate {
    #[validate(length(min = 1, message = "classroom_id must not be empty"))]
    pub(crate) classroom_id: String,
    #[validate(length(min = 1, message = "subject_id must not be empty"))]
    pub(crate) subject_id: String,
    #[serde(deserialize_with = "super::deserialize_date")]
    pub(crate) session_date: Date,
    #[validate(nested)]
    pub(crate) records: Vec<AttendanceRecordIn>,
}

impl AttendanceSessionCreate {
    pub(crate) fn into_command(self) -> RecordSession {
        RecordSession {
            classroom_id: self.classroom_id,
            subject_id: self.subject_id,
            session_date: self.session_date,
            records: self
                .records
                .into_iter()
                .map(|record| RecordEntry { student_id: record.student_id, status: record.status })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) subject_id: String,
    pub(crate) session_date: String,
    pub(crate) recorded_by: String,
    pub(crate) created_at: String,
}

impl SessionResponse {
    pub(crate) fn from_db(session: AttendanceSession) -> Self {
        Self {
            id: session.id,
            classroom_id: session.classroom_id,
            subject_id: session.subject_id,
            session_date: format_date(session.session_date),
            recorded_by: session.recorded_by,
            created_at: format_primitive(session.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RecordedSessionResponse {
    pub(crate) session_id: String,
    pub(crate) session: SessionResponse,
    pub(crate) record_count: usize,
    pub(crate) students_assessed: usize,
    pub(crate) alerts_created: usize,
    pub(crate) alerts_refreshed: usize,
    pub(crate) cases_created: usize,
}

impl RecordedSessionResponse {
    pub(crate) fn from_service(recorded: RecordedSession) -> Self {
        Self {
            session_id: recorded.session.id.clone(),
            session: SessionResponse::from_db(recorded.session),
            record_count: recorded.record_count,
            students_assessed: recorded.risk.students,
            alerts_created: recorded.risk.alerts_created,
            alerts_refreshed: recorded.risk.alerts_refreshed,
            cases_created: recorded.risk.cases_created,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionSummaryResponse {
    #[serde(flatten)]
    pub(crate) session: SessionResponse,
    pub(crate) record_count: i64,
    pub(crate) absent_count: i64,
}

impl SessionSummaryResponse {
    pub(crate) fn from_row(row: SessionSummaryRow) -> Self {
        Self {
            session: SessionResponse::from_db(row.session),
            record_count: row.record_count,
            absent_count: row.absent_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttendanceEntryResponse {
    pub(crate) session_id: String,
    pub(crate) subject_id: String,
    pub(crate) subject_name: String,
    pub(crate) session_date: String,
    pub(crate) status: crate::db::types::AttendanceStatus,
}

impl AttendanceEntryResponse {
    pub(crate) fn from_row(row: RecentAttendanceRow) -> Self {
        Self {
            session_id: row.session_id,
            subject_id: row.subject_id,
            subject_name: row.subject_name,
            session_date: format_date(row.session_date),
            status: row.status,
        }
    }
}
