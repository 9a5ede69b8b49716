//! Pipeline and task status records, plus the read-time views built from them.
//!
//! Only leaf facts (task entries) are stored. Pipeline and run aggregates are
//! recomputed from those facts on every read and never written back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TrackingError, TrackingResult};
use crate::id::{JobId, PipelineId};
use crate::job::{Job, JsonMap};
use crate::retry::Emptiness;
use crate::rollup::{rollup, RollupStatus};

/// Status of a task, and (after rollup) of a pipeline or a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Unknown,
    NotStarted,
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Unknown,
        TaskStatus::NotStarted,
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl RollupStatus for TaskStatus {
    const FAILED: Self = TaskStatus::Failed;
    const COMPLETED: Self = TaskStatus::Completed;
    const IN_PROGRESS: Self = TaskStatus::InProgress;

    fn is_failure(&self) -> bool {
        *self == TaskStatus::Failed
    }

    fn is_success(&self) -> bool {
        *self == TaskStatus::Completed
    }
}

/// One task's last reported state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: JsonMap,
    pub updated_at: DateTime<Utc>,
}

/// Descriptive pipeline fields, including what is needed to auto-provision the run's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
}

impl PipelineMeta {
    /// Overwrite stored fields with the ones the writer supplied.
    pub fn merge(&mut self, other: &PipelineMeta) {
        fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
            if incoming.is_some() {
                slot.clone_from(incoming);
            }
        }
        take(&mut self.page_number, &other.page_number);
        take(&mut self.order, &other.order);
        take(&mut self.app_id, &other.app_id);
        take(&mut self.tenant_id, &other.tenant_id);
        take(&mut self.patient_id, &other.patient_id);
        take(&mut self.document_id, &other.document_id);
        take(&mut self.pages, &other.pages);
    }

    /// Job-creation fields as metadata for an auto-provisioned job.
    pub fn job_metadata(&self) -> JsonMap {
        let mut map = JsonMap::new();
        let mut put = |key: &str, value: Option<serde_json::Value>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };
        put("app_id", self.app_id.clone().map(Into::into));
        put("tenant_id", self.tenant_id.clone().map(Into::into));
        put("patient_id", self.patient_id.clone().map(Into::into));
        put("document_id", self.document_id.clone().map(Into::into));
        put("pages", self.pages.map(Into::into));
        map
    }
}

/// A status report from an executor for one task of one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatusUpdate {
    /// Task name, or a page number for page-level pipelines. Falls back to
    /// `page_number` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_key: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(flatten)]
    pub meta: PipelineMeta,
}

impl PipelineStatusUpdate {
    pub fn task(task_key: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_key: Some(task_key.into()),
            status,
            ..Default::default()
        }
    }

    pub fn page(page_number: u32, status: TaskStatus) -> Self {
        Self {
            status,
            meta: PipelineMeta {
                page_number: Some(page_number),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn task_key(&self) -> TrackingResult<String> {
        match (&self.task_key, self.meta.page_number) {
            (Some(key), _) if !key.trim().is_empty() => Ok(key.clone()),
            (Some(_), _) => Err(TrackingError::validation("task_key must not be empty")),
            (None, Some(page)) => Ok(page.to_string()),
            (None, None) => Err(TrackingError::validation(
                "either task_key or page_number is required",
            )),
        }
    }
}

/// Stored per-pipeline record (one hash field per pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub pipeline_id: PipelineId,
    #[serde(flatten)]
    pub meta: PipelineMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl PipelineRecord {
    /// Order by `order` with unordered pipelines last, then by id.
    pub fn sort_for_display(records: &mut [PipelineRecord]) {
        records.sort_by(|a, b| {
            (a.meta.order.is_none(), a.meta.order, &a.pipeline_id)
                .cmp(&(b.meta.order.is_none(), b.meta.order, &b.pipeline_id))
        });
    }

    pub fn new(pipeline_id: PipelineId, now: DateTime<Utc>) -> Self {
        Self {
            pipeline_id,
            meta: PipelineMeta::default(),
            created_at: now,
            updated_at: now,
            tasks: BTreeMap::new(),
        }
    }

    /// Record one task report; other tasks are left as they are.
    pub fn apply(&mut self, update: &PipelineStatusUpdate, now: DateTime<Utc>) -> TrackingResult<()> {
        let key = update.task_key()?;
        self.meta.merge(&update.meta);
        self.tasks.insert(
            key,
            TaskEntry {
                status: update.status,
                metadata: update.metadata.clone(),
                updated_at: now,
            },
        );
        self.updated_at = now;
        Ok(())
    }

    pub fn status(&self) -> TaskStatus {
        rollup(self.tasks.values().map(|t| t.status))
    }

    /// True iff there are tasks and every key is a page number.
    pub fn is_page_level(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.keys().all(|k| k.parse::<u64>().is_ok())
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let end = if self.status().is_terminal() {
            self.updated_at
        } else {
            now
        };
        seconds_between(self.created_at, end)
    }

    pub fn view(&self, now: DateTime<Utc>) -> PipelineView {
        PipelineView {
            pipeline_id: self.pipeline_id.clone(),
            status: self.status(),
            is_page_level: self.is_page_level(),
            elapsed_time: self.elapsed_seconds(now),
            task_count: self.tasks.len(),
            meta: self.meta.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            tasks: self.tasks.clone(),
        }
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

/// Read-time view of a pipeline with its computed aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineView {
    pub pipeline_id: PipelineId,
    pub status: TaskStatus,
    pub is_page_level: bool,
    /// Seconds.
    pub elapsed_time: f64,
    pub task_count: usize,
    #[serde(flatten)]
    pub meta: PipelineMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tasks: BTreeMap<String, TaskEntry>,
}

/// Read-time view of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: JobId,
    pub status: TaskStatus,
    /// Seconds.
    pub elapsed_time: f64,
    pub pipeline_count: usize,
    pub pipeline_ids: Vec<PipelineId>,
    pub pipelines: Vec<PipelineView>,
    #[serde(default)]
    pub job: Option<Job>,
}

impl RunStatus {
    /// Build the run view from its stored records.
    ///
    /// Pipelines are ordered by `order` (unordered last), then by id.
    pub fn from_records(
        run_id: JobId,
        job: Option<Job>,
        mut records: Vec<PipelineRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        PipelineRecord::sort_for_display(&mut records);

        let pipelines: Vec<PipelineView> = records.iter().map(|r| r.view(now)).collect();
        let status = rollup(pipelines.iter().map(|p| p.status));

        let first_created = records.iter().map(|r| r.created_at).min();
        let last_updated = records.iter().map(|r| r.updated_at).max();
        let elapsed_time = match (first_created, last_updated) {
            (Some(start), Some(last)) if status.is_terminal() => seconds_between(start, last),
            (Some(start), _) => seconds_between(start, now),
            _ => job
                .as_ref()
                .map(|j| seconds_between(j.created_at, now))
                .unwrap_or(0.0),
        };

        Self {
            run_id,
            status,
            elapsed_time,
            pipeline_count: pipelines.len(),
            pipeline_ids: pipelines.iter().map(|p| p.pipeline_id.clone()).collect(),
            pipelines,
            job,
        }
    }
}

impl Emptiness for PipelineView {
    fn is_empty_result(&self) -> bool {
        self.task_count == 0
    }
}

impl Emptiness for RunStatus {
    fn is_empty_result(&self) -> bool {
        self.pipeline_count == 0
    }
}
