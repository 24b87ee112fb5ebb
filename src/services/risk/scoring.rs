use std::collections::BTreeMap;

use time::Date;

use crate::core::config::RiskSettings;
use crate::db::types::{AttendanceStatus, RiskLevel};
use crate::repositories::attendance::HistoryRow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SubjectStats {
    pub(crate) total_sessions: i32,
    pub(crate) absence_count: i32,
    pub(crate) late_count: i32,
    pub(crate) absence_rate: f64,
    pub(crate) streak: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assessment {
    pub(crate) subjects: BTreeMap<String, SubjectStats>,
    pub(crate) full_day_streak: u32,
    pub(crate) score: f64,
    pub(crate) level: RiskLevel,
}

impl Assessment {
    pub(crate) fn subject(&self, subject_id: &str) -> Option<&SubjectStats> {
        self.subjects.get(subject_id)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn absence_rate(absence_count: i32, total_sessions: i32) -> f64 {
    round2(100.0 * f64::from(absence_count) / f64::from(total_sessions.max(1)))
}

/// Leading `absent` statuses; input must be newest first.
pub(crate) fn leading_absences(statuses: impl IntoIterator<Item = AttendanceStatus>) -> u32 {
    statuses.into_iter().take_while(|status| *status == AttendanceStatus::Absent).count() as u32
}

/// Consecutive record-dates, newest first, on which every record is `absent`.
pub(crate) fn full_day_streak(rows: &[HistoryRow]) -> u32 {
    let mut days: BTreeMap<Date, bool> = BTreeMap::new();
    for row in rows {
        let all_absent = days.entry(row.session_date).or_insert(true);
        *all_absent &= row.status == AttendanceStatus::Absent;
    }
    days.values().rev().take_while(|all_absent| **all_absent).count() as u32
}

/// Clamped raw score. Levels are classified on this value; only the stored
/// figure is rounded.
pub(crate) fn score(
    max_absence_rate: f64,
    max_subject_streak: u32,
    full_day_streak: u32,
    settings: &RiskSettings,
) -> f64 {
    let raw = max_absence_rate * settings.absence_rate_weight
        + f64::from(max_subject_streak) * settings.subject_streak_weight
        + f64::from(full_day_streak) * settings.full_day_streak_weight;
    raw.clamp(0.0, 100.0)
}

pub(crate) fn classify(score: f64, settings: &RiskSettings) -> RiskLevel {
    if score >= settings.critical_threshold {
        RiskLevel::Critical
    } else if score >= settings.high_threshold {
        RiskLevel::High
    } else if score >= settings.medium_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Derives every risk figure of one student from their full record history.
/// Input order does not matter.
pub(crate) fn assess(rows: &[HistoryRow], settings: &RiskSettings) -> Assessment {
    let mut ordered: Vec<&HistoryRow> = rows.iter().collect();
    ordered.sort_by(|left, right| {
        right
            .session_date
            .cmp(&left.session_date)
            .then_with(|| left.subject_id.cmp(&right.subject_id))
    });

    let mut by_subject: BTreeMap<String, Vec<AttendanceStatus>> = BTreeMap::new();
    for row in &ordered {
        by_subject.entry(row.subject_id.clone()).or_default().push(row.status);
    }

    let subjects: BTreeMap<String, SubjectStats> = by_subject
        .into_iter()
        .map(|(subject_id, statuses)| {
            let total_sessions = statuses.len() as i32;
            let absence_count =
                statuses.iter().filter(|status| **status == AttendanceStatus::Absent).count()
                    as i32;
            let late_count =
                statuses.iter().filter(|status| **status == AttendanceStatus::Late).count() as i32;
            let stats = SubjectStats {
                total_sessions,
                absence_count,
                late_count,
                absence_rate: absence_rate(absence_count, total_sessions),
                streak: leading_absences(statuses.iter().copied()),
            };
            (subject_id, stats)
        })
        .collect();

    let max_rate = subjects.values().map(|stats| stats.absence_rate).fold(0.0, f64::max);
    let max_streak = subjects.values().map(|stats| stats.streak).max().unwrap_or(0);
    let full_day_streak = full_day_streak(rows);
    let raw = score(max_rate, max_streak, full_day_streak, settings);

    Assessment { subjects, full_day_streak, score: round2(raw), level: classify(raw, settings) }
}

/// Subject alert condition: a long streak or a high absence rate.
pub(crate) fn needs_subject_alert(stats: &SubjectStats, settings: &RiskSettings) -> bool {
    stats.streak >= settings.subject_streak_limit || stats.absence_rate >= settings.absence_rate_limit
}

pub(crate) fn needs_full_day_alert(assessment: &Assessment, settings: &RiskSettings) -> bool {
    assessment.full_day_streak >= settings.full_day_streak_limit
}
