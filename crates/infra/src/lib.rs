//! `djt-infra`: storage-facing side of job and pipeline tracking.
//!
//! Components share one [`kv::KvStore`] and one key layout:
//! - [`jobs::JobStore`]: job CRUD with TTL tiers
//! - [`pipelines::PipelineTracker`]: per-pipeline task status
//! - [`pipelines::RunAggregator`]: run-level rollup
//! - [`jobs::JobTreeResolver`]: parent/sub-job trees
//! - [`stats::StatsEngine`]: scan-based analytics

mod codec;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod keys;
pub mod kv;
pub mod pipelines;
pub mod stats;

pub use config::{ConfigError, TrackingConfig};
pub use engine::TrackingEngine;
pub use jobs::{JobStore, JobTree, JobTreeResolver};
pub use kv::{InMemoryKvStore, KeyTtl, KvStore, StoreError};
pub use pipelines::{PipelineTracker, RunAggregator};
pub use stats::StatsEngine;
