use serde::{Deserialize, Serialize};
use time::Date;
use validator::Validate;

use crate::core::time::{format_date, format_primitive};
use crate::db::models::{InterventionCase, InterventionMeeting, ProgressUpdate};
use crate::db::types::{CaseStatus, ProgressStatus};
use crate::services::cases::{CaseDetail, CasePatch, NewCase};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CaseCreate {
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    #[serde(default)]
    pub(crate) alert_id: Option<String>,
    #[validate(length(min = 1, message = "assigned_to must not be empty"))]
    pub(crate) assigned_to: String,
}

impl CaseCreate {
    pub(crate) fn into_new_case(self) -> NewCase {
        NewCase {
            student_id: self.student_id,
            alert_id: self.alert_id.filter(|id| !id.trim().is_empty()),
            assigned_to: self.assigned_to,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CaseUpdate {
    #[validate(range(min = 1, message = "expected_version must be positive"))]
    pub(crate) expected_version: i32,
    #[serde(default)]
    pub(crate) status: Option<CaseStatus>,
    #[serde(default)]
    pub(crate) progress_status: Option<ProgressStatus>,
    #[serde(default, deserialize_with = "super::deserialize_optional_date")]
    pub(crate) meeting_date: Option<Date>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "meeting_notes is too long"))]
    pub(crate) meeting_notes: Option<String>,
    #[serde(default, deserialize_with = "super::deserialize_optional_date")]
    pub(crate) follow_up_date: Option<Date>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "escalation_reason is too long"))]
    pub(crate) escalation_reason: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "resolution_notes is too long"))]
    pub(crate) resolution_notes: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "assigned_to must not be empty"))]
    pub(crate) assigned_to: Option<String>,
}

impl CaseUpdate {
    pub(crate) fn into_patch(self) -> CasePatch {
        CasePatch {
            expected_version: self.expected_version,
            status: self.status,
            progress_status: self.progress_status,
            meeting_date: self.meeting_date,
            meeting_notes: self.meeting_notes,
            follow_up_date: self.follow_up_date,
            escalation_reason: self.escalation_reason,
            resolution_notes: self.resolution_notes,
            assigned_to: self.assigned_to,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct MeetingCreate {
    #[serde(deserialize_with = "super::deserialize_date")]
    pub(crate) meeting_date: Date,
    #[validate(length(min = 1, max = 5000, message = "notes must be 1 to 5000 characters"))]
    pub(crate) notes: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ProgressCreate {
    #[validate(length(min = 1, max = 5000, message = "note must be 1 to 5000 characters"))]
    pub(crate) note: String,
    #[serde(default)]
    pub(crate) progress_status: Option<ProgressStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CaseResponse {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) alert_id: Option<String>,
    pub(crate) assigned_to: String,
    pub(crate) created_by: Option<String>,
    pub(crate) status: CaseStatus,
    pub(crate) version: i32,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) meeting_date: Option<String>,
    pub(crate) meeting_notes: Option<String>,
    pub(crate) follow_up_date: Option<String>,
    pub(crate) escalation_reason: Option<String>,
    pub(crate) resolution_notes: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) closed_at: Option<String>,
}

impl CaseResponse {
    pub(crate) fn from_db(case: InterventionCase) -> Self {
        Self {
            id: case.id,
            student_id: case.student_id,
            alert_id: case.alert_id,
            assigned_to: case.assigned_to,
            created_by: case.created_by,
            status: case.status,
            version: case.version,
            progress_status: case.progress_status,
            meeting_date: case.meeting_date.map(format_date),
            meeting_notes: case.meeting_notes,
            follow_up_date: case.follow_up_date.map(format_date),
            escalation_reason: case.escalation_reason,
            resolution_notes: case.resolution_notes,
            created_at: format_primitive(case.created_at),
            updated_at: format_primitive(case.updated_at),
            closed_at: case.closed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MeetingResponse {
    pub(crate) id: String,
    pub(crate) case_id: String,
    pub(crate) meeting_date: String,
    pub(crate) notes: String,
    pub(crate) recorded_by: String,
    pub(crate) created_at: String,
}

impl MeetingResponse {
    pub(crate) fn from_db(meeting: InterventionMeeting) -> Self {
        Self {
            id: meeting.id,
            case_id: meeting.case_id,
            meeting_date: format_date(meeting.meeting_date),
            notes: meeting.notes,
            recorded_by: meeting.recorded_by,
            created_at: format_primitive(meeting.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProgressResponse {
    pub(crate) id: String,
    pub(crate) case_id: String,
    pub(crate) note: String,
    pub(crate) progress_status: Option<ProgressStatus>,
    pub(crate) recorded_by: String,
    pub(crate) created_at: String,
}

impl ProgressResponse {
    pub(crate) fn from_db(update: ProgressUpdate) -> Self {
        Self {
            id: update.id,
            case_id: update.case_id,
            note: update.note,
            progress_status: update.progress_status,
            recorded_by: update.recorded_by,
            created_at: format_primitive(update.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CaseDetailResponse {
    #[serde(flatten)]
    pub(crate) case: CaseResponse,
    pub(crate) meetings: Vec<MeetingResponse>,
    pub(crate) progress_updates: Vec<ProgressResponse>,
}

impl CaseDetailResponse {
    pub(crate) fn from_service(detail: CaseDetail) -> Self {
        Self {
            case: CaseResponse::from_db(detail.case),
            meetings: detail.meetings.into_iter().map(MeetingResponse::from_db).collect(),
            progress_updates: detail
                .progress_updates
                .into_iter()
                .map(ProgressResponse::from_db)
                .collect(),
        }
    }
}
