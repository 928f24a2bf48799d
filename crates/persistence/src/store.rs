//! PostgreSQL implementation of the engine's storage seam.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::attendance::{AttendanceEntry, AttendanceRecord, MarkOutcome};
use domain::models::location_sample::{LocationSample, NewLocationSample};
use domain::models::subject::{Subject, SubjectUpsert};
use domain::models::trigger_job::{JobResolution, NewTriggerJob, TriggerJob};
use domain::models::user::{User, UserUpsert};
use domain::services::store::{AttendanceStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::attendance_mark::collect_record;
use crate::entities::{SubjectEntity, TriggerJobEntity};
use crate::repositories::{
    AttendanceRepository, LocationSampleRepository, MarkInput, SampleInput, SubjectInput,
    SubjectRepository, TriggerJobRepository, UserRepository,
};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_subject(entity: SubjectEntity) -> Result<Subject, StoreError> {
    let key = format!("{}/{}", entity.user_id, entity.subject_id);
    Subject::try_from(entity).map_err(|e| StoreError::Corrupt(format!("subject {}: {}", key, e)))
}

fn to_job(entity: TriggerJobEntity) -> Result<TriggerJob, StoreError> {
    let id = entity.id;
    TriggerJob::try_from(entity)
        .map_err(|e| StoreError::Corrupt(format!("trigger job {}: {}", id, e)))
}

fn to_jobs(entities: Vec<TriggerJobEntity>) -> Result<Vec<TriggerJob>, StoreError> {
    entities.into_iter().map(to_job).collect()
}

/// [`AttendanceStore`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgAttendanceStore {
    pool: PgPool,
    users: UserRepository,
    subjects: SubjectRepository,
    attendance: AttendanceRepository,
    samples: LocationSampleRepository,
    jobs: TriggerJobRepository,
}

impl PgAttendanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            subjects: SubjectRepository::new(pool.clone()),
            attendance: AttendanceRepository::new(pool.clone()),
            samples: LocationSampleRepository::new(pool.clone()),
            jobs: TriggerJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl AttendanceStore for PgAttendanceStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn upsert_user(&self, user: UserUpsert) -> Result<User, StoreError> {
        self.users
            .upsert(
                &user.user_id,
                user.display_name.as_deref(),
                user.push_token.as_deref(),
            )
            .await
            .map(Into::into)
            .map_err(backend)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_by_id(user_id).await.map_err(backend)?.map(Into::into))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self
            .users
            .list_all()
            .await
            .map_err(backend)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn upsert_subject(&self, subject: SubjectUpsert) -> Result<Subject, StoreError> {
        let schedule = serde_json::to_value(&subject.schedule)
            .map_err(|e| StoreError::Corrupt(format!("schedule: {}", e)))?;
        let input = SubjectInput {
            user_id: &subject.user_id,
            subject_id: &subject.subject_id,
            name: &subject.name,
            schedule,
            location_latitude: subject.location.map(|l| l.latitude),
            location_longitude: subject.location.map(|l| l.longitude),
            location_radius_meters: subject.location.map(|l| l.radius_meters),
            auto_verify: subject.auto_verify,
        };
        match self.subjects.upsert(input).await {
            Ok(entity) => to_subject(entity),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::NotFound(format!("user {}", subject.user_id)))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_subject(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> Result<Option<Subject>, StoreError> {
        self.subjects
            .find(user_id, subject_id)
            .await
            .map_err(backend)?
            .map(to_subject)
            .transpose()
    }

    async fn list_subjects(&self, user_id: &str) -> Result<Vec<Subject>, StoreError> {
        self.subjects
            .find_by_user(user_id)
            .await
            .map_err(backend)?
            .into_iter()
            .map(to_subject)
            .collect()
    }

    async fn get_attendance(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
    ) -> Result<AttendanceRecord, StoreError> {
        let rows = self
            .attendance
            .find_month(user_id, subject_id, month_key)
            .await
            .map_err(backend)?;
        collect_record(month_key, rows).map_err(StoreError::Corrupt)
    }

    async fn find_attendance_entry(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
        day: u32,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let Ok(day) = i16::try_from(day) else {
            return Ok(None);
        };
        self.attendance
            .find_day(user_id, subject_id, month_key, day)
            .await
            .map_err(backend)?
            .map(|row| AttendanceEntry::try_from(row).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn mark_attendance(&self, entry: AttendanceEntry) -> Result<MarkOutcome, StoreError> {
        let day = i16::try_from(entry.day)
            .map_err(|_| StoreError::Corrupt(format!("day out of range: {}", entry.day)))?;
        let inserted = self
            .attendance
            .insert_if_undecided(MarkInput {
                user_id: &entry.user_id,
                subject_id: &entry.subject_id,
                month_key: &entry.month_key,
                day,
                mark: entry.decision.mark.as_str(),
                reason: entry.decision.reason.as_str(),
                distance_meters: entry.decision.distance_meters,
                decided_at: entry.decided_at,
            })
            .await
            .map_err(backend)?;
        Ok(if inserted {
            MarkOutcome::Recorded
        } else {
            MarkOutcome::AlreadyDecided
        })
    }

    async fn insert_location_sample(
        &self,
        sample: NewLocationSample,
    ) -> Result<LocationSample, StoreError> {
        self.samples
            .insert(SampleInput {
                user_id: &sample.user_id,
                subject_id: &sample.subject_id,
                latitude: sample.latitude,
                longitude: sample.longitude,
                captured_at: sample.captured_at,
                received_at: sample.received_at,
            })
            .await
            .map(Into::into)
            .map_err(backend)
    }

    async fn latest_location_sample(
        &self,
        user_id: &str,
        subject_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<LocationSample>, StoreError> {
        Ok(self
            .samples
            .find_latest_between(user_id, subject_id, from, to)
            .await
            .map_err(backend)?
            .map(Into::into))
    }

    async fn purge_location_samples(
        &self,
        captured_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.samples
            .delete_captured_before(captured_before)
            .await
            .map_err(backend)
    }

    async fn insert_trigger_job(
        &self,
        job: NewTriggerJob,
    ) -> Result<Option<TriggerJob>, StoreError> {
        self.jobs
            .insert_pending(
                &job.user_id,
                &job.subject_id,
                job.class_date,
                job.trigger_at,
                job.created_at,
            )
            .await
            .map_err(backend)?
            .map(to_job)
            .transpose()
    }

    async fn find_trigger_job(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
    ) -> Result<Option<TriggerJob>, StoreError> {
        self.jobs
            .find_by_key(user_id, subject_id, class_date)
            .await
            .map_err(backend)?
            .map(to_job)
            .transpose()
    }

    async fn pending_jobs_due(&self, now: DateTime<Utc>) -> Result<Vec<TriggerJob>, StoreError> {
        to_jobs(self.jobs.find_pending_due(now).await.map_err(backend)?)
    }

    async fn mark_job_dispatched(
        &self,
        job_id: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.jobs
            .mark_dispatched(job_id, dispatched_at)
            .await
            .map_err(backend)
    }

    async fn dispatched_jobs_before(
        &self,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<TriggerJob>, StoreError> {
        to_jobs(
            self.jobs
                .find_dispatched_before(dispatched_before)
                .await
                .map_err(backend)?,
        )
    }

    async fn resolve_trigger_job(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
    ) -> Result<bool, StoreError> {
        self.jobs
            .resolve(
                job_id,
                resolution.outcome.as_str(),
                resolution.distance_meters,
                resolution.resolved_at,
            )
            .await
            .map_err(backend)
    }

    async fn open_trigger_jobs(&self) -> Result<Vec<TriggerJob>, StoreError> {
        to_jobs(self.jobs.find_open().await.map_err(backend)?)
    }

    async fn purge_resolved_jobs(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        self.jobs
            .delete_resolved_before(created_before)
            .await
            .map_err(backend)
    }
}
