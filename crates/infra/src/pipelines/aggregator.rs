//! Run-level view: the job plus every pipeline, rolled up at read time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use djt_core::{Job, JobId, PipelineRecord, RunStatus, TrackingError, TrackingResult};
use tracing::{instrument, warn};

use crate::codec::decode;
use crate::keys::{JOB_FIELD, KeySchema, pipeline_id_from_field};
use crate::kv::KvStore;

/// Decode every `pipeline:*` field of a run hash, skipping undecodable ones.
pub(crate) fn decode_pipelines(key: &str, fields: &HashMap<String, String>) -> Vec<PipelineRecord> {
    fields
        .iter()
        .filter(|(field, _)| pipeline_id_from_field(field).is_some())
        .filter_map(|(field, raw)| match decode::<PipelineRecord>(raw, &format!("{key}/{field}")) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(key, field = %field, error = %err, "skipping undecodable pipeline");
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct RunAggregator {
    kv: Arc<dyn KvStore>,
    keys: KeySchema,
}

impl std::fmt::Debug for RunAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunAggregator").field("keys", &self.keys).finish_non_exhaustive()
    }
}

impl RunAggregator {
    pub fn new(kv: Arc<dyn KvStore>, keys: KeySchema) -> Self {
        Self { kv, keys }
    }

    /// One `HGETALL` of the run key, then rollup over the decoded pipelines.
    #[instrument(skip(self), err)]
    pub async fn get_run_status(&self, run_id: &JobId) -> TrackingResult<RunStatus> {
        let key = self.keys.run_key(run_id);
        let fields = self.kv.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(TrackingError::not_found(format!("run {run_id}")));
        }

        let job = match fields.get(JOB_FIELD) {
            Some(raw) => match decode::<Job>(raw, &format!("{key}/{JOB_FIELD}")) {
                Ok(job) => Some(job),
                Err(err) => {
                    warn!(key = %key, error = %err, "run job record undecodable");
                    None
                }
            },
            None => None,
        };
        let records = decode_pipelines(&key, &fields);
        Ok(RunStatus::from_records(run_id.clone(), job, records, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use djt_core::{PipelineId, PipelineStatusUpdate, TaskStatus};

    use crate::config::TrackingConfig;
    use crate::jobs::JobStore;
    use crate::kv::InMemoryKvStore;
    use crate::pipelines::PipelineTracker;

    #[tokio::test]
    async fn two_pipeline_run() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let jobs = JobStore::new(kv.clone(), &TrackingConfig::default());
        let tracker = PipelineTracker::new(kv.clone(), jobs.clone());
        let runs = RunAggregator::new(kv, jobs.keys().clone());

        let r1 = JobId::parse("r1").unwrap();
        let p1 = PipelineId::parse("p1").unwrap();
        let p2 = PipelineId::parse("p2").unwrap();
        for (pipeline, task, status) in [
            (&p1, "extract", TaskStatus::Completed),
            (&p1, "classify", TaskStatus::Failed),
            (&p2, "1", TaskStatus::Completed),
            (&p2, "2", TaskStatus::InProgress),
        ] {
            tracker
                .upsert_pipeline_status(&r1, pipeline, &PipelineStatusUpdate::task(task, status))
                .await
                .unwrap();
        }

        let run = runs.get_run_status(&r1).await.unwrap();
        assert_eq!(run.status, TaskStatus::Failed);
        assert_eq!(run.pipeline_count, 2);
        assert_eq!(run.pipelines[0].status, TaskStatus::Failed);
        assert_eq!(run.pipelines[1].status, TaskStatus::InProgress);
        assert!(run.pipelines[1].is_page_level);
        assert!(run.job.is_some());
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let runs = RunAggregator::new(kv, KeySchema::new("djt::"));
        assert!(matches!(
            runs.get_run_status(&JobId::parse("nope").unwrap()).await,
            Err(TrackingError::NotFound(_))
        ));
    }
}
