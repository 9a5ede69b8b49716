//! Job records, creation trees and partial updates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TrackingError, TrackingResult};
use crate::id::JobId;

/// Opaque key/value map used for payloads, results and metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Retry budget applied when a creation request does not name one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Deepest `sub_jobs` nesting accepted at creation (and followed when resolving trees).
pub const MAX_JOB_TREE_DEPTH: usize = 8;

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DataProcessing,
    DocumentAnalysis,
    EntityExtraction,
    MedicationExtraction,
    #[default]
    Custom,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::DataProcessing,
        JobType::DocumentAnalysis,
        JobType::EntityExtraction,
        JobType::MedicationExtraction,
        JobType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DataProcessing => "data_processing",
            JobType::DocumentAnalysis => "document_analysis",
            JobType::EntityExtraction => "entity_extraction",
            JobType::MedicationExtraction => "medication_extraction",
            JobType::Custom => "custom",
        }
    }
}

/// Job execution status as reported by executors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Retrying,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Retrying => "retrying",
        }
    }
}

/// Advisory priority; the engine never orders work by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [
        JobPriority::Low,
        JobPriority::Normal,
        JobPriority::High,
        JobPriority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
            JobPriority::Critical => "critical",
        }
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: JobPriority,
    /// Percent complete, 0..=100. Last write wins; not required to be monotonic.
    pub progress: f64,
    #[serde(default)]
    pub payload: JsonMap,
    #[serde(default)]
    pub result: Option<JsonMap>,
    #[serde(default)]
    pub metadata: JsonMap,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    pub max_retries: u32,
    pub retry_count: u32,
    /// Advisory only; evaluated by readers, never enforced.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub depends_on: Vec<JobId>,
    #[serde(default)]
    pub parent_job_id: Option<JobId>,
    #[serde(default)]
    pub sub_job_ids: Vec<JobId>,
    #[serde(default)]
    pub is_parent_job: bool,

    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub worker_host: Option<String>,
}

impl Job {
    /// A fresh pending job with default bookkeeping.
    pub fn new(id: JobId, job_type: JobType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            priority: JobPriority::Normal,
            progress: 0.0,
            payload: JsonMap::new(),
            result: None,
            metadata: JsonMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            scheduled_at: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_count: 0,
            timeout_seconds: None,
            depends_on: Vec::new(),
            parent_job_id: None,
            sub_job_ids: Vec::new(),
            is_parent_job: false,
            worker_id: None,
            worker_host: None,
        }
    }

    /// Seconds since `started_at`, if the job has started.
    pub fn running_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.started_at
            .map(|started| (now - started).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// Seconds between start and completion, if both are known.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Whether a non-terminal job has outlived its advisory timeout.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match (self.timeout_seconds, self.running_seconds(now)) {
            (Some(limit), Some(elapsed)) => elapsed > limit as f64,
            _ => false,
        }
    }

    /// Merge a partial update. Validation happens before any field changes,
    /// so a rejected update leaves the job untouched.
    pub fn apply_update(&mut self, update: JobUpdate, now: DateTime<Utc>) -> TrackingResult<TtlChange> {
        if let Some(progress) = update.progress {
            validate_progress(progress)?;
        }
        let max_retries = update.max_retries.unwrap_or(self.max_retries);
        let retry_count = update.retry_count.unwrap_or(self.retry_count);
        if retry_count > max_retries {
            return Err(TrackingError::validation(format!(
                "retry_count ({retry_count}) exceeds max_retries ({max_retries})"
            )));
        }

        let previous = self.status;
        let change = TtlChange::for_transition(previous, update.status);

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(payload) = update.payload {
            self.payload = payload;
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(at) = update.scheduled_at {
            self.scheduled_at = Some(at);
        }
        self.max_retries = max_retries;
        self.retry_count = retry_count;
        if let Some(timeout) = update.timeout_seconds {
            self.timeout_seconds = Some(timeout);
        }
        if let Some(depends_on) = update.depends_on {
            self.depends_on = dedup_preserving_order(depends_on);
        }
        if let Some(parent) = update.parent_job_id {
            self.parent_job_id = Some(parent);
        }
        if let Some(worker_id) = update.worker_id {
            self.worker_id = Some(worker_id);
        }
        if let Some(worker_host) = update.worker_host {
            self.worker_host = Some(worker_host);
        }

        // Stamp transition times the writer did not supply.
        if update.status == Some(JobStatus::Running) && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.status.is_terminal() && update.status.is_some() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        self.updated_at = now;
        Ok(change)
    }
}

fn validate_progress(progress: f64) -> TrackingResult<()> {
    if !progress.is_finite() || !(0.0..=100.0).contains(&progress) {
        return Err(TrackingError::validation(format!(
            "progress must be within [0, 100], got {progress}"
        )));
    }
    Ok(())
}

fn dedup_preserving_order(ids: Vec<JobId>) -> Vec<JobId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// How a job update moves the run key between retention tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlChange {
    /// Leave whatever TTL the key currently has.
    Unchanged,
    /// Shorten to the post-completion TTL.
    PostComplete,
    /// Restore the default TTL (a finished job was reopened).
    Default,
}

impl TtlChange {
    pub fn for_transition(previous: JobStatus, requested: Option<JobStatus>) -> Self {
        match requested {
            Some(next) if next.is_terminal() => TtlChange::PostComplete,
            Some(_) if previous.is_terminal() => TtlChange::Default,
            _ => TtlChange::Unchanged,
        }
    }
}

/// Creation request. `sub_jobs` nests; the tree is stored as flat records linked by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub payload: JsonMap,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_host: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_jobs: Vec<JobCreate>,
}

impl JobCreate {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_sub_job(mut self, sub_job: JobCreate) -> Self {
        self.sub_jobs.push(sub_job);
        self
    }

    /// Flatten the creation tree into records, root first (pre-order).
    ///
    /// Missing ids are generated; children point at their parent and the
    /// parent lists its children in request order.
    pub fn into_jobs(self, now: DateTime<Utc>) -> TrackingResult<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut seen = HashSet::new();
        let parent = self.parent_job_id.clone();
        flatten(self, parent, 1, now, &mut jobs, &mut seen)?;
        Ok(jobs)
    }
}

fn flatten(
    request: JobCreate,
    parent: Option<JobId>,
    depth: usize,
    now: DateTime<Utc>,
    out: &mut Vec<Job>,
    seen: &mut HashSet<JobId>,
) -> TrackingResult<JobId> {
    if depth > MAX_JOB_TREE_DEPTH {
        return Err(TrackingError::validation(format!(
            "sub_jobs nesting exceeds {MAX_JOB_TREE_DEPTH} levels"
        )));
    }

    let JobCreate {
        id,
        job_type,
        priority,
        payload,
        metadata,
        max_retries,
        timeout_seconds,
        scheduled_at,
        depends_on,
        parent_job_id: _,
        worker_id,
        worker_host,
        sub_jobs,
    } = request;

    let id = id.unwrap_or_else(JobId::generate);
    if !seen.insert(id.clone()) {
        return Err(TrackingError::validation(format!(
            "job id {id} appears more than once in the creation tree"
        )));
    }

    let mut job = Job::new(id.clone(), job_type, now);
    job.priority = priority;
    job.payload = payload;
    job.metadata = metadata;
    job.max_retries = max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
    job.timeout_seconds = timeout_seconds;
    job.scheduled_at = scheduled_at;
    job.depends_on = dedup_preserving_order(depends_on);
    job.parent_job_id = parent;
    job.worker_id = worker_id;
    job.worker_host = worker_host;

    let index = out.len();
    out.push(job);

    let mut children = Vec::with_capacity(sub_jobs.len());
    for child in sub_jobs {
        children.push(flatten(child, Some(id.clone()), depth + 1, now, out, seen)?);
    }

    let job = &mut out[index];
    job.is_parent_job = !children.is_empty();
    job.sub_job_ids = children;
    Ok(id)
}

/// Reply to a creation request. `message` says whether the job was stored
/// or already existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job: Job,
    pub message: String,
}

impl CreateJobResponse {
    pub const CREATED: &'static str = "job created";
    pub const ALREADY_EXISTS: &'static str = "job already exists";

    pub fn created(job: Job) -> Self {
        Self {
            job,
            message: Self::CREATED.to_string(),
        }
    }

    pub fn existing(job: Job) -> Self {
        Self {
            job,
            message: Self::ALREADY_EXISTS.to_string(),
        }
    }

    pub fn was_created(&self) -> bool {
        self.message == Self::CREATED
    }
}

impl crate::retry::Emptiness for CreateJobResponse {
    fn is_empty_result(&self) -> bool {
        false
    }
}

/// Partial update; `None` fields are left untouched.
///
/// `sub_job_ids` is deliberately absent: a parent's set of children is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<JobPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<JobId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_host: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>, worker_host: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self.worker_host = Some(worker_host.into());
        self
    }
}
