//! `djt-core`: domain model for distributed job and pipeline tracking.
//!
//! Pure types and computations only: job records, pipeline/task status,
//! status rollup, retry policy and stats. Storage lives in `djt-infra`.

pub mod error;
pub mod id;
pub mod job;
pub mod pipeline;
pub mod retry;
pub mod rollup;
pub mod stats;

pub use error::{TrackingError, TrackingResult};
pub use id::{JobId, PipelineId, RunId};
pub use job::{
    CreateJobResponse, Job, JobCreate, JobPriority, JobStatus, JobType, JobUpdate, JsonMap,
    TtlChange,
};
pub use pipeline::{
    PipelineMeta, PipelineRecord, PipelineStatusUpdate, PipelineView, RunStatus, TaskEntry,
    TaskStatus,
};
pub use retry::{Emptiness, RetryPolicy};
pub use rollup::{rollup, RollupStatus};
pub use stats::{HealthReport, HealthStatus, HoursWindow};
