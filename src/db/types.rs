use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "userrole", rename_all = "snake_case")]
pub(crate) enum UserRole {
    Admin,
    FormMaster,
    Teacher,
}

impl UserRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::FormMaster => "form_master",
            Self::Teacher => "teacher",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "form_master" => Ok(Self::FormMaster),
            "teacher" => Ok(Self::Teacher),
            other => Err(format!("Unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "attendancestatus", rename_all = "lowercase")]
pub(crate) enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            "excused" => Ok(Self::Excused),
            _ => Err(format!("Unknown attendance status '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "risklevel", rename_all = "lowercase")]
pub(crate) enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub(crate) const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical findings open intervention cases automatically.
    pub(crate) fn requires_case(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "alerttype", rename_all = "snake_case")]
pub(crate) enum AlertType {
    Attendance,
    FullDayAbsence,
}

impl AlertType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::FullDayAbsence => "full_day_absence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "alertstatus", rename_all = "snake_case")]
pub(crate) enum AlertStatus {
    Active,
    UnderReview,
    Escalated,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub(crate) const ALL: [Self; 5] =
        [Self::Active, Self::UnderReview, Self::Escalated, Self::Resolved, Self::Dismissed];

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::UnderReview => "under_review",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "casestatus", rename_all = "snake_case")]
pub(crate) enum CaseStatus {
    Open,
    InProgress,
    AwaitingParent,
    EscalatedToAdmin,
    Closed,
}

impl CaseStatus {
    pub(crate) const ALL: [Self; 5] =
        [Self::Open, Self::InProgress, Self::AwaitingParent, Self::EscalatedToAdmin, Self::Closed];
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::AwaitingParent => "awaiting_parent",
            Self::EscalatedToAdmin => "escalated_to_admin",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "progressstatus", rename_all = "snake_case")]
pub(crate) enum ProgressStatus {
    NotStarted,
    Improving,
    NoChange,
    Worsening,
}
