//! Job storage.
//!
//! [`JobStore`] is the seam between request handling and background
//! processing: the submitter creates jobs, processor tasks write terminal
//! outcomes, and pollers read snapshots. [`MemoryJobStore`] keeps everything
//! in process memory and optionally evicts finished jobs after a TTL.
//!
//! ## Locking
//!
//! The job map is behind an `RwLock` that is only write-locked to insert or
//! evict. Each job sits behind its own `Mutex`, so tasks updating records of
//! different jobs never contend, and tasks of the same job contend only for
//! the few instructions it takes to write one record. A processor task owns a
//! single `(job_id, index)` pair, so no two writers ever target the same
//! record; the store still rejects a second terminal write as a guard.

use crate::error::OcrJobError;
use crate::record::{ImageDescriptor, Job, JobId, RecordOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Storage contract for jobs and their per-image records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Allocate a new job with one `processing` record per image.
    ///
    /// The job is fully visible to [`JobStore::get`] once this returns.
    async fn create(&self, images: &[ImageDescriptor]) -> Result<JobId, OcrJobError>;

    /// Snapshot of a job.
    async fn get(&self, job_id: &str) -> Result<Job, OcrJobError>;

    /// Write the terminal outcome of record `index`.
    async fn update_record(
        &self,
        job_id: &str,
        index: usize,
        outcome: RecordOutcome,
    ) -> Result<(), OcrJobError>;

    /// Evict expired jobs. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// In-process job store.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
    ttl: Option<Duration>,
}

impl MemoryJobStore {
    /// A store that keeps jobs until the process exits.
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    /// A store that evicts finished jobs older than `ttl` on
    /// [`JobStore::purge_expired`].
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of jobs currently held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn entry(&self, job_id: &str) -> Result<Arc<Mutex<Job>>, OcrJobError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| OcrJobError::UnknownJob {
                job_id: job_id.to_string(),
            })
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, images: &[ImageDescriptor]) -> Result<JobId, OcrJobError> {
        if images.is_empty() {
            return Err(OcrJobError::EmptyBatch);
        }
        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), images);
        self.jobs
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(job)));
        debug!("Created job {} with {} records", id, images.len());
        Ok(id)
    }

    async fn get(&self, job_id: &str) -> Result<Job, OcrJobError> {
        let entry = self.entry(job_id).await?;
        let job = entry.lock().await;
        Ok(job.clone())
    }

    async fn update_record(
        &self,
        job_id: &str,
        index: usize,
        outcome: RecordOutcome,
    ) -> Result<(), OcrJobError> {
        let entry = self.entry(job_id).await?;
        let mut job = entry.lock().await;
        let len = job.records.len();
        let record = job
            .records
            .get_mut(index)
            .ok_or_else(|| OcrJobError::RecordOutOfRange {
                job_id: job_id.to_string(),
                index,
                len,
            })?;
        if record.is_done() {
            return Err(OcrJobError::RecordAlreadyDone {
                job_id: job_id.to_string(),
                index,
            });
        }
        record.complete(outcome);
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let Some(cutoff) = chrono::TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };

        let snapshot: Vec<(JobId, Arc<Mutex<Job>>)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, job)| (id.clone(), Arc::clone(job)))
            .collect();

        let mut expired = Vec::new();
        for (id, job) in snapshot {
            let job = job.lock().await;
            // Unfinished jobs stay so their pollers can still see the result.
            if job.created_at < cutoff && job.is_finished() {
                expired.push(id);
            }
        }

        if expired.is_empty() {
            return 0;
        }
        let mut jobs = self.jobs.write().await;
        let removed = expired
            .iter()
            .filter(|id| jobs.remove(id.as_str()).is_some())
            .count();
        info!("Evicted {} expired jobs", removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use crate::record::RecordStatus;

    fn images(names: &[&str]) -> Vec<ImageDescriptor> {
        names
            .iter()
            .map(|n| ImageDescriptor::new(*n, format!("/uploads/{n}")))
            .collect()
    }

    fn success() -> RecordOutcome {
        RecordOutcome::Recognised {
            text: "hi".into(),
            words: vec![],
            defects: vec![],
        }
    }

    #[tokio::test]
    async fn create_seeds_processing_records_in_order() {
        let store = MemoryJobStore::new();
        let id = store.create(&images(&["a.png", "b.png"])).await.unwrap();

        let job = store.get(&id).await.unwrap();
        let names: Vec<_> = job.records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png"]);
        assert!(job
            .records
            .iter()
            .all(|r| r.status == RecordStatus::Processing && r.text.is_none()));
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = MemoryJobStore::new();
        let a = store.create(&images(&["a.png"])).await.unwrap();
        let b = store.create(&images(&["a.png"])).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let store = MemoryJobStore::new();
        let err = store.create(&[]).await.unwrap_err();
        assert!(matches!(err, OcrJobError::EmptyBatch));
    }

    #[tokio::test]
    async fn unknown_job_is_explicit() {
        let store = MemoryJobStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, OcrJobError::UnknownJob { .. }));
    }

    #[tokio::test]
    async fn update_is_terminal() {
        let store = MemoryJobStore::new();
        let id = store.create(&images(&["a.png"])).await.unwrap();

        store.update_record(&id, 0, success()).await.unwrap();
        let err = store
            .update_record(&id, 0, RecordOutcome::Failed(ImageError::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrJobError::RecordAlreadyDone { index: 0, .. }));

        let record = &store.get(&id).await.unwrap().records[0];
        assert_eq!(record.text.as_deref(), Some("hi"));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn out_of_range_index() {
        let store = MemoryJobStore::new();
        let id = store.create(&images(&["a.png"])).await.unwrap();
        let err = store.update_record(&id, 3, success()).await.unwrap_err();
        assert!(matches!(
            err,
            OcrJobError::RecordOutOfRange { index: 3, len: 1, .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_disjoint_indices() {
        let store = Arc::new(MemoryJobStore::new());
        let names: Vec<String> = (0..32).map(|i| format!("{i}.png")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let id = store.create(&images(&refs)).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.spawn(async move {
                store
                    .update_record(
                        &id,
                        i,
                        RecordOutcome::Recognised {
                            text: format!("text {i}"),
                            words: vec![],
                            defects: vec![],
                        },
                    )
                    .await
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        let job = store.get(&id).await.unwrap();
        for (i, r) in job.records.iter().enumerate() {
            assert_eq!(r.text.as_deref(), Some(format!("text {i}").as_str()));
        }
    }

    #[tokio::test]
    async fn purge_without_ttl_keeps_everything() {
        let store = MemoryJobStore::new();
        let id = store.create(&images(&["a.png"])).await.unwrap();
        store.update_record(&id, 0, success()).await.unwrap();
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn purge_evicts_only_old_finished_jobs() {
        let store = MemoryJobStore::with_ttl(Some(Duration::from_secs(60)));
        let old_done = store.create(&images(&["a.png"])).await.unwrap();
        let old_running = store.create(&images(&["b.png"])).await.unwrap();
        let fresh_done = store.create(&images(&["c.png"])).await.unwrap();

        store.update_record(&old_done, 0, success()).await.unwrap();
        store.update_record(&fresh_done, 0, success()).await.unwrap();

        let an_hour_ago = Utc::now() - chrono::TimeDelta::hours(1);
        for id in [&old_done, &old_running] {
            let entry = store.entry(id).await.unwrap();
            entry.lock().await.created_at = an_hour_ago;
        }

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get(&old_done).await.is_err());
        assert!(store.get(&old_running).await.is_ok());
        assert!(store.get(&fresh_done).await.is_ok());
    }
}
