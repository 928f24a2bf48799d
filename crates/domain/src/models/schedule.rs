//! Weekly class schedule model.
//!
//! A subject's schedule arrives as a loosely-shaped JSON object keyed by day
//! name. Each day may hold one `{start, end}` object or a list of them. This
//! module is the single place that turns that shape into minute-of-day
//! intervals; malformed entries are dropped here instead of failing the
//! caller.

use std::collections::BTreeMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Minutes in a day; every valid minute-of-day is strictly below this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Raw `{start, end}` pair as supplied by clients (`"HH:MM"` strings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInterval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl RawInterval {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }

    fn normalize(&self) -> Option<ClassInterval> {
        let start = parse_minute_of_day(self.start.as_deref()?)?;
        let end = parse_minute_of_day(self.end.as_deref()?)?;
        ClassInterval::new(start, end)
    }
}

/// One day's entry in the raw schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayEntry {
    /// A list of periods; elements are kept raw so one bad element does not
    /// poison the rest.
    Many(Vec<serde_json::Value>),
    Single(RawInterval),
    /// Anything else (numbers, strings, null). Ignored when normalizing.
    Other(serde_json::Value),
}

impl DayEntry {
    fn intervals(&self) -> Vec<ClassInterval> {
        match self {
            DayEntry::Single(raw) => raw.normalize().into_iter().collect(),
            DayEntry::Many(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value::<RawInterval>(item.clone()).ok())
                .filter_map(|raw| raw.normalize())
                .collect(),
            DayEntry::Other(_) => Vec::new(),
        }
    }
}

/// A class period within a day, as minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInterval {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl ClassInterval {
    /// Builds an interval; `None` unless `start < end` and both fall within one day.
    pub fn new(start_minute: u32, end_minute: u32) -> Option<Self> {
        if start_minute < end_minute && end_minute < MINUTES_PER_DAY {
            Some(Self {
                start_minute,
                end_minute,
            })
        } else {
            None
        }
    }

    /// True once `minute_of_day` has reached the end of the class.
    pub fn has_ended(&self, minute_of_day: u32) -> bool {
        minute_of_day >= self.end_minute
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end_minute - self.start_minute
    }
}

/// Weekly schedule keyed by day name (matched case-insensitively).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule(BTreeMap<String, DayEntry>);

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper, mostly for tests and seeding.
    pub fn with_day(mut self, day: &str, entry: DayEntry) -> Self {
        self.0.insert(day.to_string(), entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalized intervals for `day_name`, sorted by start.
    ///
    /// Returns an empty list when no key matches the day.
    pub fn intervals_for_day(&self, day_name: &str) -> Vec<ClassInterval> {
        let wanted = day_name.trim();
        let mut intervals: Vec<ClassInterval> = self
            .0
            .iter()
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case(wanted))
            .flat_map(|(_, entry)| entry.intervals())
            .collect();
        intervals.sort();
        intervals.dedup();
        intervals
    }
}

/// Parses `"H:MM"` / `"HH:MM"` into minutes since midnight.
pub fn parse_minute_of_day(value: &str) -> Option<u32> {
    let (hours, minutes) = value.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Lowercase English name of a weekday, as used for schedule keys.
pub fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}
