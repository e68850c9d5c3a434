//! Background job queue.
//!
//! Jobs live in memory next to the records they operate on; the queue does
//! not survive a restart, which is fine because every job targets a draft
//! and drafts are memory-only too.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::store::IntakeStore;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_RECOGNIZE_PLATE: &str = "recognize-plate";
pub const JOB_EXTRACT_DOCUMENT: &str = "extract-document";

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job {0} not found")]
    NotFound(Uuid),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn enqueue_job(
    store: &IntakeStore,
    job_type: &str,
    payload: Value,
    run_after: Option<DateTime<Utc>>,
) -> Job {
    let now = Utc::now();
    let job = Job {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: STATUS_QUEUED.to_string(),
        attempts: 0,
        run_after: run_after.unwrap_or(now),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    store.jobs.lock().await.push(job.clone());
    job
}

/// Picks the oldest runnable job of one of the given types and marks it
/// processing. Returns `None` when nothing is due.
pub async fn reserve_job(store: &IntakeStore, job_types: &[&str]) -> Option<Job> {
    let now = Utc::now();
    let mut jobs = store.jobs.lock().await;
    let job = jobs
        .iter_mut()
        .filter(|job| {
            job.status == STATUS_QUEUED
                && job.run_after <= now
                && job_types.contains(&job.job_type.as_str())
        })
        .min_by_key(|job| job.run_after)?;

    job.status = STATUS_PROCESSING.to_string();
    job.attempts += 1;
    job.updated_at = now;
    Some(job.clone())
}

pub async fn mark_job_succeeded(store: &IntakeStore, job_id: Uuid) -> JobQueueResult<()> {
    update_job(store, job_id, |job| {
        job.status = STATUS_SUCCEEDED.to_string();
        job.last_error = None;
    })
    .await
}

pub async fn retry_job_after(
    store: &IntakeStore,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    let next_run = Utc::now()
        + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30));
    update_job(store, job_id, |job| {
        job.status = STATUS_QUEUED.to_string();
        job.run_after = next_run;
        job.last_error = Some(error_message.to_string());
    })
    .await
}

pub async fn mark_job_failed(
    store: &IntakeStore,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    update_job(store, job_id, |job| {
        job.status = STATUS_FAILED.to_string();
        job.last_error = Some(error_message.to_string());
    })
    .await
}

async fn update_job(
    store: &IntakeStore,
    job_id: Uuid,
    f: impl FnOnce(&mut Job),
) -> JobQueueResult<()> {
    let mut jobs = store.jobs.lock().await;
    let job = jobs
        .iter_mut()
        .find(|job| job.id == job_id)
        .ok_or(JobQueueError::NotFound(job_id))?;
    f(job);
    job.updated_at = Utc::now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reserve_respects_type_filter_and_run_after() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntakeStore::open(dir.path().join("expedientes.json")).await;

        let later = Utc::now() + ChronoDuration::hours(1);
        enqueue_job(&store, JOB_EXTRACT_DOCUMENT, json!({}), Some(later)).await;
        let due = enqueue_job(&store, JOB_RECOGNIZE_PLATE, json!({}), None).await;

        assert!(reserve_job(&store, &[JOB_EXTRACT_DOCUMENT]).await.is_none());

        let reserved = reserve_job(&store, &[JOB_RECOGNIZE_PLATE, JOB_EXTRACT_DOCUMENT])
            .await
            .expect("due job");
        assert_eq!(reserved.id, due.id);
        assert_eq!(reserved.status, STATUS_PROCESSING);
        assert_eq!(reserved.attempts, 1);

        // Already processing, nothing else due.
        assert!(reserve_job(&store, &[JOB_RECOGNIZE_PLATE]).await.is_none());
    }

    #[tokio::test]
    async fn retry_requeues_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntakeStore::open(dir.path().join("expedientes.json")).await;
        let job = enqueue_job(&store, JOB_RECOGNIZE_PLATE, json!({}), None).await;
        reserve_job(&store, &[JOB_RECOGNIZE_PLATE]).await.unwrap();

        retry_job_after(&store, job.id, Duration::from_secs(60), "boom")
            .await
            .unwrap();
        let jobs = store.jobs.lock().await;
        assert_eq!(jobs[0].status, STATUS_QUEUED);
        assert_eq!(jobs[0].last_error.as_deref(), Some("boom"));
        assert!(jobs[0].run_after > Utc::now());
    }
}
