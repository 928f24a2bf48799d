//! Attendance ledger domain model.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which set a day lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    Present,
    Absent,
}

impl AttendanceMark {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceMark::Present => "present",
            AttendanceMark::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceMark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceMark::Present),
            "absent" => Ok(AttendanceMark::Absent),
            _ => Err(format!("Invalid attendance mark: {}", s)),
        }
    }
}

impl fmt::Display for AttendanceMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a decision was made, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    WithinRadius,
    NoTimelyLocation,
    OutOfRange,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::WithinRadius => "within_radius",
            DecisionReason::NoTimelyLocation => "no_timely_location",
            DecisionReason::OutOfRange => "out_of_range",
        }
    }
}

impl FromStr for DecisionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "within_radius" => Ok(DecisionReason::WithinRadius),
            "no_timely_location" => Ok(DecisionReason::NoTimelyLocation),
            "out_of_range" => Ok(DecisionReason::OutOfRange),
            _ => Err(format!("Invalid decision reason: {}", s)),
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A present/absent decision for one class day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDecision {
    pub mark: AttendanceMark,
    pub reason: DecisionReason,
    /// Measured distance, when a timely sample existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl AttendanceDecision {
    pub fn present(distance_meters: f64) -> Self {
        Self {
            mark: AttendanceMark::Present,
            reason: DecisionReason::WithinRadius,
            distance_meters: Some(distance_meters),
        }
    }

    pub fn absent_out_of_range(distance_meters: f64) -> Self {
        Self {
            mark: AttendanceMark::Absent,
            reason: DecisionReason::OutOfRange,
            distance_meters: Some(distance_meters),
        }
    }

    pub fn absent_no_location() -> Self {
        Self {
            mark: AttendanceMark::Absent,
            reason: DecisionReason::NoTimelyLocation,
            distance_meters: None,
        }
    }
}

/// A single ledger write: one day of one month for one (user, subject).
#[derive(Debug, Clone)]
pub struct AttendanceEntry {
    pub user_id: String,
    pub subject_id: String,
    pub month_key: String,
    pub day: u32,
    pub decision: AttendanceDecision,
    pub decided_at: DateTime<Utc>,
}

/// Result of a ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The day was undecided and now carries the mark.
    Recorded,
    /// The day was already in one of the sets; nothing changed.
    AlreadyDecided,
}

/// Per-(user, subject, month) attendance sets.
///
/// A day-of-month appears in at most one of `present` / `absent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub month_key: String,
    pub present: BTreeSet<u32>,
    pub absent: BTreeSet<u32>,
}

impl AttendanceRecord {
    pub fn empty(month_key: impl Into<String>) -> Self {
        Self {
            month_key: month_key.into(),
            ..Default::default()
        }
    }

    pub fn is_decided(&self, day: u32) -> bool {
        self.present.contains(&day) || self.absent.contains(&day)
    }

    pub fn mark_for(&self, day: u32) -> Option<AttendanceMark> {
        if self.present.contains(&day) {
            Some(AttendanceMark::Present)
        } else if self.absent.contains(&day) {
            Some(AttendanceMark::Absent)
        } else {
            None
        }
    }

    /// Set-union insert guarded by the decided check.
    pub fn insert(&mut self, day: u32, mark: AttendanceMark) -> MarkOutcome {
        if self.is_decided(day) {
            return MarkOutcome::AlreadyDecided;
        }
        match mark {
            AttendanceMark::Present => self.present.insert(day),
            AttendanceMark::Absent => self.absent.insert(day),
        };
        MarkOutcome::Recorded
    }
}

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Ledger key for the month containing `date`, e.g. `"march 2025"`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{} {}", MONTH_NAMES[date.month0() as usize], date.year())
}

/// Normalizes a month key supplied by a caller (`"March 2025"` -> `"march 2025"`).
///
/// Returns `None` when the value is not `<month name> <year>`.
pub fn normalize_month_key(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let month = parts.next()?.to_ascii_lowercase();
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !MONTH_NAMES.contains(&month.as_str()) {
        return None;
    }
    Some(format!("{} {}", month, year))
}
