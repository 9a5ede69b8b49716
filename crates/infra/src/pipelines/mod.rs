//! Per-pipeline task status and run-level aggregation.

pub mod aggregator;
pub mod tracker;

pub use aggregator::RunAggregator;
pub use tracker::PipelineTracker;
