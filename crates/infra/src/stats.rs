//! Analytics over the live job population.
//!
//! Each call takes one snapshot (prefix scan plus a read per key) and computes
//! its figures from that snapshot. Population size is bounded by the TTL tiers.

use std::sync::Arc;

use chrono::Utc;
use djt_core::stats::{
    ActiveJob, CountMap, PerformanceMetrics, QueueDepth, StatsOverview, Throughput, WorkerStats,
    active_jobs, count_by_priority, count_by_status, count_by_type, failed_jobs, worker_stats,
};
use djt_core::{HealthReport, HoursWindow, Job, TrackingResult};
use tracing::{instrument, warn};

use crate::jobs::JobStore;
use crate::kv::KvStore;

#[derive(Clone)]
pub struct StatsEngine {
    kv: Arc<dyn KvStore>,
    jobs: JobStore,
}

impl std::fmt::Debug for StatsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsEngine").field("jobs", &self.jobs).finish_non_exhaustive()
    }
}

impl StatsEngine {
    pub fn new(kv: Arc<dyn KvStore>, jobs: JobStore) -> Self {
        Self { kv, jobs }
    }

    pub async fn snapshot(&self) -> TrackingResult<Vec<Job>> {
        self.jobs.live_jobs().await
    }

    pub async fn overview(&self) -> TrackingResult<StatsOverview> {
        Ok(StatsOverview::compute(&self.snapshot().await?, Utc::now()))
    }

    pub async fn by_status(&self) -> TrackingResult<CountMap> {
        Ok(count_by_status(&self.snapshot().await?))
    }

    pub async fn by_type(&self) -> TrackingResult<CountMap> {
        Ok(count_by_type(&self.snapshot().await?))
    }

    pub async fn by_priority(&self) -> TrackingResult<CountMap> {
        Ok(count_by_priority(&self.snapshot().await?))
    }

    pub async fn performance(&self, window: HoursWindow) -> TrackingResult<PerformanceMetrics> {
        Ok(PerformanceMetrics::compute(&self.snapshot().await?, window, Utc::now()))
    }

    pub async fn throughput(&self, window: HoursWindow) -> TrackingResult<Throughput> {
        Ok(Throughput::compute(&self.snapshot().await?, window, Utc::now()))
    }

    pub async fn active_jobs(&self) -> TrackingResult<Vec<ActiveJob>> {
        Ok(active_jobs(&self.snapshot().await?, Utc::now()))
    }

    pub async fn failed_jobs(&self, window: HoursWindow) -> TrackingResult<Vec<Job>> {
        Ok(failed_jobs(&self.snapshot().await?, window, Utc::now()))
    }

    pub async fn queue_depth(&self) -> TrackingResult<QueueDepth> {
        Ok(QueueDepth::compute(&self.snapshot().await?))
    }

    pub async fn worker_stats(&self) -> TrackingResult<Vec<WorkerStats>> {
        Ok(worker_stats(&self.snapshot().await?))
    }

    /// Never fails: an unreachable store is reported as unhealthy.
    #[instrument(skip(self))]
    pub async fn health(&self) -> HealthReport {
        if let Err(err) = self.kv.ping().await {
            warn!(error = %err, "store ping failed");
            return HealthReport::unreachable(err.to_string(), Utc::now());
        }
        match self.snapshot().await {
            Ok(jobs) => HealthReport::evaluate(&jobs, Utc::now()),
            Err(err) => {
                warn!(error = %err, "job snapshot failed");
                HealthReport::unreachable(err.to_string(), Utc::now())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use djt_core::{HealthStatus, JobCreate, JobId, JobStatus, JobType, JobUpdate};

    use crate::config::TrackingConfig;
    use crate::kv::{InMemoryKvStore, KeyTtl, StoreError};

    struct DownStore;

    #[async_trait]
    impl KvStore for DownStore {
        async fn hget(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn hset(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn hgetall(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn ttl(&self, _: &str) -> Result<KeyTtl, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn del(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn scan_prefix(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn engine(kv: Arc<dyn KvStore>) -> (JobStore, StatsEngine) {
        let jobs = JobStore::new(kv.clone(), &TrackingConfig::default());
        (jobs.clone(), StatsEngine::new(kv, jobs))
    }

    #[tokio::test]
    async fn stats_reflect_live_jobs() {
        let (jobs, stats) = engine(Arc::new(InMemoryKvStore::new()));
        for (id, job_type) in [("a", JobType::DataProcessing), ("b", JobType::DataProcessing), ("c", JobType::Custom)] {
            jobs.create_job(JobCreate::new(job_type).with_id(JobId::parse(id).unwrap()))
                .await
                .unwrap();
        }
        jobs.update_job(
            &JobId::parse("a").unwrap(),
            JobUpdate::status(JobStatus::Running).with_worker("w1", "host-1"),
        )
        .await
        .unwrap();
        jobs.update_job(&JobId::parse("b").unwrap(), JobUpdate::status(JobStatus::Failed))
            .await
            .unwrap();

        let overview = stats.overview().await.unwrap();
        assert_eq!(overview.total_jobs, 3);
        assert_eq!(overview.by_type["data_processing"], 2);
        assert_eq!(overview.by_status["failed"], 1);
        assert_eq!(stats.queue_depth().await.unwrap().pending, 1);
        assert_eq!(stats.active_jobs().await.unwrap().len(), 1);
        assert_eq!(stats.failed_jobs(HoursWindow::default()).await.unwrap().len(), 1);
        assert_eq!(stats.worker_stats().await.unwrap()[0].worker_id, "w1");

        let health = stats.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.live_jobs, 3);
    }

    #[tokio::test]
    async fn unreachable_store_is_unhealthy() {
        let (_, stats) = engine(Arc::new(DownStore));
        let health = stats.health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(stats.overview().await.unwrap_err().is_retryable());
    }
}
