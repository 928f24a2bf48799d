//! Engine-wide settings and local-time resolution.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc,
};

use super::trigger_policy::TriggerPolicy;
use crate::models::location_sample::TimeWindow;
use crate::models::schedule::day_name;

/// Tunables shared by the scheduler, queue and ingest path.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Window after dispatch during which a sample counts for the job.
    pub grace_window: Duration,
    /// How far before dispatch a capture time may lie and still count.
    pub capture_skew: Duration,
    pub trigger_policy: TriggerPolicy,
    /// Offset of the campus time zone; schedules are written in local time.
    pub utc_offset: FixedOffset,
    /// Resolved jobs older than this are purged.
    pub job_retention: Duration,
    /// Location samples older than this are purged.
    pub sample_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_window: Duration::minutes(5),
            capture_skew: Duration::zero(),
            trigger_policy: TriggerPolicy::Midpoint,
            utc_offset: Utc.fix(),
            job_retention: Duration::days(2),
            sample_retention: Duration::days(30),
        }
    }
}

impl EngineSettings {
    /// Capture times accepted for a job dispatched at `dispatched_at`.
    pub fn timeliness_window(&self, dispatched_at: DateTime<Utc>) -> TimeWindow {
        TimeWindow::after(dispatched_at, self.grace_window, self.capture_skew)
    }

    /// Resolves one consistent local view of `now`.
    pub fn local_now(&self, now: DateTime<Utc>) -> LocalNow {
        let local = now.with_timezone(&self.utc_offset);
        LocalNow {
            instant: now,
            date: local.date_naive(),
            day_name: day_name(local.weekday()),
            minute_of_day: local.hour() * 60 + local.minute(),
            offset: self.utc_offset,
        }
    }
}

/// A single clock reading, in both UTC and campus-local terms.
#[derive(Debug, Clone, Copy)]
pub struct LocalNow {
    pub instant: DateTime<Utc>,
    pub date: NaiveDate,
    pub day_name: &'static str,
    pub minute_of_day: u32,
    offset: FixedOffset,
}

impl LocalNow {
    /// The UTC instant of `minute_of_day` on the local date.
    pub fn instant_at_minute(&self, minute_of_day: u32) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(minute_of_day * 60, 0)?;
        let local = self.date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Some(DateTime::from_naive_utc_and_offset(utc, Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_now_with_offset() {
        let settings = EngineSettings {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            ..Default::default()
        };
        // 2025-03-02 23:30 UTC is Monday 01:30 at UTC+2
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 23, 30, 0).unwrap();
        let local = settings.local_now(now);

        assert_eq!(local.date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(local.day_name, "monday");
        assert_eq!(local.minute_of_day, 90);
    }

    #[test]
    fn test_instant_at_minute_converts_back_to_utc() {
        let settings = EngineSettings {
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        let local = settings.local_now(now);

        // 09:30 at UTC-5 is 14:30 UTC
        assert_eq!(
            local.instant_at_minute(570),
            Some(Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap())
        );
        assert_eq!(local.instant_at_minute(24 * 60), None);
    }

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.grace_window, Duration::minutes(5));
        assert_eq!(settings.job_retention, Duration::days(2));
        assert_eq!(settings.trigger_policy, TriggerPolicy::Midpoint);
        assert_eq!(settings.capture_skew, Duration::zero());
    }

    #[test]
    fn test_timeliness_window_starts_at_dispatch() {
        let settings = EngineSettings::default();
        let dispatched_at = Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0).unwrap();
        let window = settings.timeliness_window(dispatched_at);

        assert_eq!(window.start, dispatched_at);
        assert_eq!(window.end, dispatched_at + Duration::minutes(5));
    }
}
