//! Job storage.
//!
//! Every job lives in its own run key under the `job` field. TTL tiers:
//! creation applies the default TTL; a terminal status shortens it to the
//! post-complete TTL; reopening a finished job restores the default.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use djt_core::{
    CreateJobResponse, Job, JobCreate, JobId, JobStatus, JobType, JobUpdate, PipelineMeta,
    TrackingError, TrackingResult, TtlChange,
};
use tracing::{debug, info, instrument, warn};

use crate::codec::{decode, encode};
use crate::config::TrackingConfig;
use crate::keys::{JOB_FIELD, KeySchema};
use crate::kv::{KeyTtl, KvStore};

#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
    keys: KeySchema,
    default_ttl: Duration,
    post_complete_ttl: Duration,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("keys", &self.keys)
            .field("default_ttl", &self.default_ttl)
            .field("post_complete_ttl", &self.post_complete_ttl)
            .finish_non_exhaustive()
    }
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>, config: &TrackingConfig) -> Self {
        Self {
            kv,
            keys: KeySchema::new(config.key_prefix.clone()),
            default_ttl: config.default_ttl,
            post_complete_ttl: config.post_complete_ttl,
        }
    }

    pub fn keys(&self) -> &KeySchema {
        &self.keys
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Create a job and its nested sub-jobs.
    ///
    /// Replaying a creation whose root already exists returns the stored root
    /// unchanged. A sub-job id that already exists rejects the whole request
    /// before anything is written. Sub-jobs are written before the root, so a
    /// present root implies a complete tree.
    #[instrument(skip(self, request), err)]
    pub async fn create_job(&self, request: JobCreate) -> TrackingResult<CreateJobResponse> {
        let now = Utc::now();
        let jobs = request.into_jobs(now)?;
        let Some(root_id) = jobs.first().map(|j| j.id.clone()) else {
            return Err(TrackingError::validation("empty creation request"));
        };

        if let Some(existing) = self.get_job(&root_id).await? {
            debug!(job_id = %root_id, "job already exists");
            return Ok(CreateJobResponse::existing(existing));
        }

        for job in jobs.iter().skip(1) {
            if self.job_exists(&job.id).await? {
                return Err(TrackingError::validation(format!(
                    "sub-job {} already exists",
                    job.id
                )));
            }
        }

        for job in jobs.iter().skip(1).rev() {
            self.write_new(job).await?;
        }
        let root = &jobs[0];
        self.write_new(root).await?;

        info!(job_id = %root.id, sub_jobs = jobs.len() - 1, job_type = root.job_type.as_str(), "job created");
        Ok(CreateJobResponse::created(root.clone()))
    }

    async fn write_new(&self, job: &Job) -> TrackingResult<()> {
        let key = self.keys.run_key(&job.id);
        self.kv.hset(&key, JOB_FIELD, &encode(job)?).await?;
        self.kv.expire(&key, self.default_ttl).await?;
        Ok(())
    }

    /// The job stored for `run_id`; `None` when absent or expired.
    #[instrument(skip(self), err)]
    pub async fn get_job(&self, run_id: &JobId) -> TrackingResult<Option<Job>> {
        let key = self.keys.run_key(run_id);
        match self.kv.hget(&key, JOB_FIELD).await? {
            Some(raw) => Ok(Some(decode(&raw, &format!("{key}/{JOB_FIELD}"))?)),
            None => Ok(None),
        }
    }

    /// Merge a partial update into the stored job and adjust the key's TTL tier.
    #[instrument(skip(self, update), err)]
    pub async fn update_job(&self, run_id: &JobId, update: JobUpdate) -> TrackingResult<Job> {
        let mut job = self
            .get_job(run_id)
            .await?
            .ok_or_else(|| TrackingError::not_found(format!("job {run_id}")))?;

        let previous = job.status;
        let change = job.apply_update(update, Utc::now())?;

        let key = self.keys.run_key(run_id);
        self.kv.hset(&key, JOB_FIELD, &encode(&job)?).await?;
        match change {
            TtlChange::PostComplete => {
                self.kv.expire(&key, self.post_complete_ttl).await?;
            }
            TtlChange::Default => {
                self.kv.expire(&key, self.default_ttl).await?;
            }
            // The key may have expired between the read and the write.
            TtlChange::Unchanged => {
                if self.kv.ttl(&key).await? == KeyTtl::Persistent {
                    self.kv.expire(&key, self.default_ttl).await?;
                }
            }
        }

        if previous != job.status {
            info!(job_id = %run_id, from = previous.as_str(), to = job.status.as_str(), "job status changed");
        }
        Ok(job)
    }

    /// Remove the whole run key, pipelines included.
    #[instrument(skip(self), err)]
    pub async fn delete_job(&self, run_id: &JobId) -> TrackingResult<bool> {
        let removed = self.kv.del(&self.keys.run_key(run_id)).await?;
        if removed {
            info!(job_id = %run_id, "run deleted");
        }
        Ok(removed)
    }

    pub async fn job_exists(&self, run_id: &JobId) -> TrackingResult<bool> {
        Ok(self
            .kv
            .hget(&self.keys.run_key(run_id), JOB_FIELD)
            .await?
            .is_some())
    }

    /// Give a run that only has pipeline reports a job record.
    ///
    /// Returns true when a job was written.
    pub(crate) async fn provision_for_pipeline(
        &self,
        run_id: &JobId,
        meta: &PipelineMeta,
        now: DateTime<Utc>,
    ) -> TrackingResult<bool> {
        if self.job_exists(run_id).await? {
            return Ok(false);
        }
        let mut job = Job::new(run_id.clone(), JobType::DocumentAnalysis, now);
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.metadata = meta.job_metadata();

        self.kv
            .hset(&self.keys.run_key(run_id), JOB_FIELD, &encode(&job)?)
            .await?;
        info!(job_id = %run_id, "job provisioned from pipeline report");
        Ok(true)
    }

    /// Every live job, read key by key after a prefix scan.
    ///
    /// Keys that expire mid-scan or hold no job are skipped; undecodable
    /// records are skipped with a warning.
    #[instrument(skip(self), err)]
    pub async fn live_jobs(&self) -> TrackingResult<Vec<Job>> {
        let keys = self.kv.scan_prefix(self.keys.prefix()).await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.kv.hget(&key, JOB_FIELD).await? else {
                continue;
            };
            match decode::<Job>(&raw, &key) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!(key = %key, error = %err, "skipping undecodable job"),
            }
        }
        debug!(jobs = jobs.len(), "live job snapshot");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::kv::{InMemoryKvStore, StoreError};

    fn store() -> (Arc<InMemoryKvStore>, JobStore) {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = JobStore::new(kv.clone(), &TrackingConfig::default());
        (kv, store)
    }

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    async fn ttl_secs(kv: &InMemoryKvStore, key: &str) -> u64 {
        match kv.ttl(key).await.unwrap() {
            KeyTtl::Expires(d) => d.as_secs(),
            other => panic!("unexpected ttl {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_follows_status_tiers() {
        let (kv, store) = store();
        store
            .create_job(JobCreate::new(JobType::DataProcessing).with_id(id("j1")))
            .await
            .unwrap();
        assert_eq!(ttl_secs(&kv, "djt::j1").await, 43_200);

        store.update_job(&id("j1"), JobUpdate::progress(50.0)).await.unwrap();
        assert_eq!(ttl_secs(&kv, "djt::j1").await, 43_200);

        store
            .update_job(&id("j1"), JobUpdate::status(JobStatus::Failed))
            .await
            .unwrap();
        assert_eq!(ttl_secs(&kv, "djt::j1").await, 3_600);

        store.update_job(&id("j1"), JobUpdate::progress(60.0)).await.unwrap();
        assert_eq!(ttl_secs(&kv, "djt::j1").await, 3_600);

        store
            .update_job(&id("j1"), JobUpdate::status(JobStatus::Retrying))
            .await
            .unwrap();
        assert_eq!(ttl_secs(&kv, "djt::j1").await, 43_200);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_jobs_read_as_absent() {
        let (_, store) = store();
        store
            .create_job(JobCreate::new(JobType::Custom).with_id(id("j")))
            .await
            .unwrap();
        store
            .update_job(&id("j"), JobUpdate::status(JobStatus::Completed))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(3_601)).await;
        assert_eq!(store.get_job(&id("j")).await.unwrap(), None);
        assert!(matches!(
            store.update_job(&id("j"), JobUpdate::progress(1.0)).await,
            Err(TrackingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn creation_is_idempotent() {
        let (_, store) = store();
        let request = JobCreate::new(JobType::Custom).with_id(id("j"));
        let first = store.create_job(request.clone()).await.unwrap();
        assert!(first.was_created());

        store.update_job(&id("j"), JobUpdate::progress(10.0)).await.unwrap();
        let again = store.create_job(request).await.unwrap();
        assert_eq!(again.message, "job already exists");
        assert_eq!(again.job.progress, 10.0);
    }

    #[tokio::test]
    async fn sub_jobs_get_their_own_keys() {
        let (kv, store) = store();
        let request = JobCreate::new(JobType::DocumentAnalysis)
            .with_id(id("root"))
            .with_sub_job(JobCreate::new(JobType::EntityExtraction).with_id(id("a")))
            .with_sub_job(JobCreate::new(JobType::MedicationExtraction).with_id(id("b")));
        let created = store.create_job(request).await.unwrap();
        assert_eq!(created.job.sub_job_ids, vec![id("a"), id("b")]);

        let child = store.get_job(&id("b")).await.unwrap().unwrap();
        assert_eq!(child.parent_job_id, Some(id("root")));
        assert_eq!(kv.scan_prefix("djt::").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejected_update_is_not_written() {
        let (_, store) = store();
        store
            .create_job(JobCreate::new(JobType::Custom).with_id(id("j")))
            .await
            .unwrap();
        let err = store.update_job(&id("j"), JobUpdate::progress(250.0)).await.unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));
        assert_eq!(store.get_job(&id("j")).await.unwrap().unwrap().progress, 0.0);
    }

    #[tokio::test]
    async fn delete_and_exists() {
        let (_, store) = store();
        store
            .create_job(JobCreate::new(JobType::Custom).with_id(id("j")))
            .await
            .unwrap();
        assert!(store.job_exists(&id("j")).await.unwrap());
        assert!(store.delete_job(&id("j")).await.unwrap());
        assert!(!store.job_exists(&id("j")).await.unwrap());
        assert!(!store.delete_job(&id("j")).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_records_surface_on_read_and_are_skipped_in_scans() {
        let (kv, store) = store();
        kv.hset("djt::bad", JOB_FIELD, "{not json").await.unwrap();
        store
            .create_job(JobCreate::new(JobType::Custom).with_id(id("good")))
            .await
            .unwrap();

        assert!(matches!(store.get_job(&id("bad")).await, Err(TrackingError::Corrupt(_))));
        let live = store.live_jobs().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, id("good"));
    }

    #[tokio::test]
    async fn existing_sub_job_rejects_creation_and_is_left_intact() {
        let (kv, store) = store();
        store
            .create_job(JobCreate::new(JobType::DataProcessing).with_id(id("a")))
            .await
            .unwrap();
        store
            .update_job(
                &id("a"),
                JobUpdate {
                    status: Some(JobStatus::Running),
                    progress: Some(70.0),
                    worker_id: Some("w1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let before = store.get_job(&id("a")).await.unwrap().unwrap();

        let request = JobCreate::new(JobType::DocumentAnalysis)
            .with_id(id("r2"))
            .with_sub_job(JobCreate::new(JobType::EntityExtraction).with_id(id("fresh")))
            .with_sub_job(JobCreate::new(JobType::Custom).with_id(id("a")));
        let err = store.create_job(request).await.unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));

        assert_eq!(store.get_job(&id("a")).await.unwrap(), Some(before));
        assert!(!store.job_exists(&id("r2")).await.unwrap());
        assert!(!store.job_exists(&id("fresh")).await.unwrap());
        assert_eq!(kv.scan_prefix("djt::").await.unwrap().len(), 1);
    }

    /// Deletes the key right after it is read, as if it expired mid-update.
    struct ExpiresAfterRead(InMemoryKvStore);

    #[async_trait]
    impl KvStore for ExpiresAfterRead {
        async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
            let value = self.0.hget(key, field).await?;
            self.0.del(key).await?;
            Ok(value)
        }
        async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
            self.0.hset(key, field, value).await
        }
        async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
            self.0.hgetall(key).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
            self.0.expire(key, ttl).await
        }
        async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
            self.0.ttl(key).await
        }
        async fn del(&self, key: &str) -> Result<bool, StoreError> {
            self.0.del(key).await
        }
        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.0.exists(key).await
        }
        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.0.scan_prefix(prefix).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn update_racing_expiry_still_leaves_a_ttl() {
        let inner = InMemoryKvStore::new();
        let job = Job::new(id("j"), JobType::Custom, Utc::now());
        inner.hset("djt::j", JOB_FIELD, &encode(&job).unwrap()).await.unwrap();
        inner.expire("djt::j", Duration::from_secs(60)).await.unwrap();

        let kv = Arc::new(ExpiresAfterRead(inner));
        let store = JobStore::new(kv.clone(), &TrackingConfig::default());
        store.update_job(&id("j"), JobUpdate::progress(5.0)).await.unwrap();

        assert_eq!(kv.ttl("djt::j").await.unwrap(), KeyTtl::Expires(Duration::from_secs(43_200)));
    }
}
