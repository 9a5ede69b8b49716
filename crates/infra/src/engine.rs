//! One handle over every tracking component, sharing a store.

use std::sync::Arc;

use crate::config::TrackingConfig;
use crate::jobs::{JobStore, JobTreeResolver};
use crate::kv::{InMemoryKvStore, KvStore};
use crate::pipelines::{PipelineTracker, RunAggregator};
use crate::stats::StatsEngine;

#[derive(Debug, Clone)]
pub struct TrackingEngine {
    pub jobs: JobStore,
    pub pipelines: PipelineTracker,
    pub runs: RunAggregator,
    pub trees: JobTreeResolver,
    pub stats: StatsEngine,
}

impl TrackingEngine {
    pub fn new(kv: Arc<dyn KvStore>, config: TrackingConfig) -> Self {
        let jobs = JobStore::new(kv.clone(), &config);
        Self {
            pipelines: PipelineTracker::new(kv.clone(), jobs.clone()),
            runs: RunAggregator::new(kv.clone(), jobs.keys().clone()),
            trees: JobTreeResolver::new(jobs.clone()),
            stats: StatsEngine::new(kv, jobs.clone()),
            jobs,
        }
    }

    pub fn in_memory(config: TrackingConfig) -> Self {
        Self::new(Arc::new(InMemoryKvStore::new()), config)
    }
}
