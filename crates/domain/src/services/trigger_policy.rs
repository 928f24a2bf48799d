//! Trigger instant policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::schedule::ClassInterval;

/// Where inside a class period the location check is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Halfway through the class (integer minutes, rounded down).
    #[default]
    Midpoint,
    /// At the scheduled end of the class.
    EndOfClass,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPolicy::Midpoint => "midpoint",
            TriggerPolicy::EndOfClass => "end_of_class",
        }
    }

    /// Minute-of-day at which the check should fire for `interval`.
    pub fn trigger_minute(&self, interval: &ClassInterval) -> u32 {
        match self {
            TriggerPolicy::Midpoint => interval.start_minute + interval.duration_minutes() / 2,
            TriggerPolicy::EndOfClass => interval.end_minute,
        }
    }
}

impl FromStr for TriggerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "midpoint" => Ok(TriggerPolicy::Midpoint),
            "end_of_class" | "end" => Ok(TriggerPolicy::EndOfClass),
            _ => Err(format!("Invalid trigger policy: {}", s)),
        }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
