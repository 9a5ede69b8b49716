//! Pipeline status writes and reads.
//!
//! Each pipeline is one hash field of its run key. A write reads, merges and
//! rewrites only that field, so writers on different pipelines of one run
//! never touch each other's data.

use std::sync::Arc;

use chrono::Utc;
use djt_core::{
    JobId, PipelineId, PipelineRecord, PipelineStatusUpdate, PipelineView, TrackingError,
    TrackingResult,
};
use tracing::{debug, instrument};

use crate::codec::{decode, encode};
use crate::jobs::JobStore;
use crate::keys::pipeline_field;
use crate::kv::{KeyTtl, KvStore};

use super::aggregator::decode_pipelines;

#[derive(Clone)]
pub struct PipelineTracker {
    kv: Arc<dyn KvStore>,
    jobs: JobStore,
}

impl std::fmt::Debug for PipelineTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineTracker").field("jobs", &self.jobs).finish_non_exhaustive()
    }
}

impl PipelineTracker {
    pub fn new(kv: Arc<dyn KvStore>, jobs: JobStore) -> Self {
        Self { kv, jobs }
    }

    /// Record one task report for a pipeline and return the pipeline's new view.
    ///
    /// A run with no job record gets one provisioned. The key is given the
    /// default TTL when it has none.
    #[instrument(skip(self, update), fields(status = ?update.status), err)]
    pub async fn upsert_pipeline_status(
        &self,
        run_id: &JobId,
        pipeline_id: &PipelineId,
        update: &PipelineStatusUpdate,
    ) -> TrackingResult<PipelineView> {
        let task_key = update.task_key()?;
        let now = Utc::now();
        let key = self.jobs.keys().run_key(run_id);
        let field = pipeline_field(pipeline_id);

        let mut record = match self.kv.hget(&key, &field).await? {
            Some(raw) => decode::<PipelineRecord>(&raw, &format!("{key}/{field}"))?,
            None => PipelineRecord::new(pipeline_id.clone(), now),
        };
        record.apply(update, now)?;
        self.kv.hset(&key, &field, &encode(&record)?).await?;

        self.jobs.provision_for_pipeline(run_id, &record.meta, now).await?;
        if self.kv.ttl(&key).await? == KeyTtl::Persistent {
            self.kv.expire(&key, self.jobs.default_ttl()).await?;
        }

        debug!(task_key = %task_key, tasks = record.tasks.len(), "pipeline task recorded");
        Ok(record.view(now))
    }

    #[instrument(skip(self), err)]
    pub async fn get_pipeline(&self, run_id: &JobId, pipeline_id: &PipelineId) -> TrackingResult<PipelineView> {
        let key = self.jobs.keys().run_key(run_id);
        let field = pipeline_field(pipeline_id);
        let raw = self
            .kv
            .hget(&key, &field)
            .await?
            .ok_or_else(|| TrackingError::not_found(format!("pipeline {pipeline_id} of run {run_id}")))?;
        let record: PipelineRecord = decode(&raw, &format!("{key}/{field}"))?;
        Ok(record.view(Utc::now()))
    }

    /// Pipelines of a run ordered by (`order`, id). Fails with NotFound when
    /// the run key is absent.
    #[instrument(skip(self), err)]
    pub async fn list_pipelines(&self, run_id: &JobId) -> TrackingResult<Vec<PipelineView>> {
        let key = self.jobs.keys().run_key(run_id);
        let fields = self.kv.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(TrackingError::not_found(format!("run {run_id}")));
        }
        let mut records = decode_pipelines(&key, &fields);
        PipelineRecord::sort_for_display(&mut records);
        let now = Utc::now();
        Ok(records.iter().map(|r| r.view(now)).collect())
    }
}
