//! Attendance mark entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::attendance::{
    AttendanceDecision, AttendanceEntry, AttendanceMark, AttendanceRecord, DecisionReason,
};
use sqlx::FromRow;

/// Database row mapping for the attendance_marks table: one decided day.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceMarkEntity {
    pub user_id: String,
    pub subject_id: String,
    pub month_key: String,
    pub day: i16,
    pub mark: String,
    pub reason: String,
    pub distance_meters: Option<f64>,
    pub decided_at: DateTime<Utc>,
}

impl TryFrom<AttendanceMarkEntity> for AttendanceEntry {
    type Error = String;

    fn try_from(entity: AttendanceMarkEntity) -> Result<Self, Self::Error> {
        let day = u32::try_from(entity.day).map_err(|_| format!("negative day {}", entity.day))?;
        let mark: AttendanceMark = entity.mark.parse()?;
        let reason: DecisionReason = entity.reason.parse()?;
        Ok(AttendanceEntry {
            user_id: entity.user_id,
            subject_id: entity.subject_id,
            month_key: entity.month_key,
            day,
            decision: AttendanceDecision {
                mark,
                reason,
                distance_meters: entity.distance_meters,
            },
            decided_at: entity.decided_at,
        })
    }
}

/// Folds the month's rows into present/absent sets.
pub fn collect_record(
    month_key: &str,
    rows: Vec<AttendanceMarkEntity>,
) -> Result<AttendanceRecord, String> {
    let mut record = AttendanceRecord::empty(month_key);
    for row in rows {
        let day = u32::try_from(row.day).map_err(|_| format!("negative day {}", row.day))?;
        let mark: AttendanceMark = row.mark.parse()?;
        record.insert(day, mark);
    }
    Ok(record)
}
