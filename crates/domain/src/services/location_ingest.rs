//! Location ingest: stores device samples and short-circuits open jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::validation::{validate_latitude, validate_longitude};

use super::geofence::{decide, GeofenceEvaluator};
use super::settings::EngineSettings;
use super::store::{AttendanceStore, StoreError};
use crate::models::attendance::AttendanceMark;
use crate::models::location_sample::{LocationSample, NewLocationSample};
use crate::models::trigger_job::JobOutcome;

/// Errors returned to the submitting device.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Unknown subject {subject_id} for user {user_id}")]
    UnknownSubject { user_id: String, subject_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A location reported by a device.
#[derive(Debug, Clone)]
pub struct LocationSubmission {
    pub user_id: String,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Defaults to the receive time when the device omits it.
    pub captured_at: Option<DateTime<Utc>>,
}

/// Result of accepting a sample.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub sample: LocationSample,
    /// Set when the sample resolved today's job immediately.
    pub resolved: Option<JobOutcome>,
}

#[derive(Clone)]
pub struct LocationIngest {
    store: Arc<dyn AttendanceStore>,
    evaluator: GeofenceEvaluator,
    settings: EngineSettings,
}

impl LocationIngest {
    pub fn new(store: Arc<dyn AttendanceStore>, settings: EngineSettings) -> Self {
        Self {
            evaluator: GeofenceEvaluator::new(store.clone()),
            store,
            settings,
        }
    }

    /// Stores the sample and, when today's job is waiting for it, resolves the
    /// job early.
    ///
    /// Only a sample that already places the user inside the geofence takes
    /// the early path. Anything else waits for the grace window to close so a
    /// fresher sample can still decide the day.
    pub async fn submit(
        &self,
        submission: LocationSubmission,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        validate_latitude(submission.latitude)
            .and_then(|_| validate_longitude(submission.longitude))
            .map_err(|e| {
                IngestError::InvalidLocation(
                    e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()),
                )
            })?;

        if self
            .store
            .get_subject(&submission.user_id, &submission.subject_id)
            .await?
            .is_none()
        {
            return Err(IngestError::UnknownSubject {
                user_id: submission.user_id,
                subject_id: submission.subject_id,
            });
        }

        let sample = self
            .store
            .insert_location_sample(NewLocationSample {
                user_id: submission.user_id,
                subject_id: submission.subject_id,
                latitude: submission.latitude,
                longitude: submission.longitude,
                captured_at: submission.captured_at.unwrap_or(now),
                received_at: now,
            })
            .await?;

        tracing::debug!(
            user_id = %sample.user_id,
            subject_id = %sample.subject_id,
            captured_at = %sample.captured_at,
            "Location sample stored"
        );

        let resolved = self.try_fast_path(&sample, now).await?;
        Ok(IngestOutcome { sample, resolved })
    }

    async fn try_fast_path(
        &self,
        sample: &LocationSample,
        now: DateTime<Utc>,
    ) -> Result<Option<JobOutcome>, StoreError> {
        let grace = self.settings.grace_window;
        let today = self.settings.local_now(now).date;
        let Some(job) = self
            .store
            .find_trigger_job(&sample.user_id, &sample.subject_id, today)
            .await?
        else {
            return Ok(None);
        };
        let Some(dispatched_at) = job.dispatched_at else {
            return Ok(None);
        };
        let window = self.settings.timeliness_window(dispatched_at);
        if !job.is_awaiting_location(now, grace) || !window.contains(sample.captured_at) {
            return Ok(None);
        }

        let Some(location) = self
            .store
            .get_subject(&job.user_id, &job.subject_id)
            .await?
            .and_then(|s| s.location)
        else {
            return Ok(None);
        };
        let freshest = self
            .store
            .latest_location_sample(&job.user_id, &job.subject_id, window.start, window.end)
            .await?;
        if decide(&location, freshest.as_ref()).mark != AttendanceMark::Present {
            return Ok(None);
        }

        let evaluation = self
            .evaluator
            .evaluate(&job.user_id, &job.subject_id, job.class_date, window, now)
            .await?;
        let resolution = self.evaluator.resolution_for(&job, &evaluation, now).await?;
        if !self.store.resolve_trigger_job(job.id, resolution).await? {
            return Ok(None);
        }

        tracing::info!(
            job_id = %job.id,
            user_id = %job.user_id,
            subject_id = %job.subject_id,
            outcome = %resolution.outcome,
            "Trigger job resolved on location arrival"
        );
        Ok(Some(resolution.outcome))
    }
}
