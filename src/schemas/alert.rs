use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_date, format_primitive};
use crate::db::models::Alert;
use crate::db::types::{AlertStatus, AlertType, RiskLevel};
use crate::services::alerts::{AlertPatch, NewAlert};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AlertCreate {
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    #[serde(default)]
    pub(crate) subject_id: Option<String>,
    pub(crate) alert_type: AlertType,
    pub(crate) risk_level: RiskLevel,
}

impl AlertCreate {
    pub(crate) fn into_new_alert(self) -> NewAlert {
        NewAlert {
            student_id: self.student_id,
            subject_id: self.subject_id.filter(|id| !id.trim().is_empty()),
            alert_type: self.alert_type,
            risk_level: self.risk_level,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AlertUpdate {
    #[serde(default)]
    pub(crate) status: Option<AlertStatus>,
    #[serde(default)]
    #[validate(length(min = 1, message = "assigned_to must not be empty"))]
    pub(crate) assigned_to: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "expected_version must be positive"))]
    pub(crate) expected_version: Option<i32>,
}

impl AlertUpdate {
    pub(crate) fn into_patch(self) -> AlertPatch {
        AlertPatch {
            status: self.status,
            assigned_to: self.assigned_to,
            expected_version: self.expected_version,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AlertResponse {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) alert_type: AlertType,
    pub(crate) status: AlertStatus,
    pub(crate) risk_level: RiskLevel,
    pub(crate) assigned_to: Option<String>,
    pub(crate) escalated_to_admin: bool,
    pub(crate) alert_date: String,
    pub(crate) created_by: Option<String>,
    pub(crate) version: i32,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) resolved_at: Option<String>,
}

impl AlertResponse {
    pub(crate) fn from_db(alert: Alert) -> Self {
        Self {
            id: alert.id,
            student_id: alert.student_id,
            subject_id: alert.subject_id,
            alert_type: alert.alert_type,
            status: alert.status,
            risk_level: alert.risk_level,
            assigned_to: alert.assigned_to,
            escalated_to_admin: alert.escalated_to_admin,
            alert_date: format_date(alert.alert_date),
            created_by: alert.created_by,
            version: alert.version,
            created_at: format_primitive(alert.created_at),
            updated_at: format_primitive(alert.updated_at),
            resolved_at: alert.resolved_at.map(format_primitive),
        }
    }
}
