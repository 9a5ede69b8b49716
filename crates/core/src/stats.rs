//! Aggregate analytics over a snapshot of live jobs.
//!
//! Everything here is a pure function of `(jobs, now)`; fetching the snapshot
//! is the store layer's job.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TrackingError, TrackingResult};
use crate::job::{Job, JobPriority, JobStatus, JobType};
use crate::retry::Emptiness;

/// Group name → count, zero-filled for every known value.
pub type CountMap = BTreeMap<String, u64>;

/// Look-back window in whole hours, bounded to one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct HoursWindow(u32);

impl HoursWindow {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 168;
    pub const DEFAULT: HoursWindow = HoursWindow(24);

    pub fn new(hours: u32) -> TrackingResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&hours) {
            return Err(TrackingError::validation(format!(
                "hours must be within [{}, {}], got {hours}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(hours))
    }

    pub fn hours(&self) -> u32 {
        self.0
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(i64::from(self.0))
    }

    fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at >= self.start(now) && at <= now
    }

    /// Index of the hourly bucket `at` falls into (oldest bucket is 0).
    fn bucket(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let offset = (at - self.start(now)).num_hours().max(0) as usize;
        offset.min(self.0 as usize - 1)
    }
}

impl Default for HoursWindow {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for HoursWindow {
    type Error = TrackingError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HoursWindow> for u32 {
    fn from(value: HoursWindow) -> Self {
        value.0
    }
}

fn zero_filled<'a>(names: impl IntoIterator<Item = &'a str>) -> CountMap {
    names.into_iter().map(|n| (n.to_string(), 0)).collect()
}

pub fn count_by_status(jobs: &[Job]) -> CountMap {
    let mut counts = zero_filled(JobStatus::ALL.iter().map(|s| s.as_str()));
    for job in jobs {
        *counts.entry(job.status.as_str().to_string()).or_default() += 1;
    }
    counts
}

pub fn count_by_type(jobs: &[Job]) -> CountMap {
    let mut counts = zero_filled(JobType::ALL.iter().map(|t| t.as_str()));
    for job in jobs {
        *counts.entry(job.job_type.as_str().to_string()).or_default() += 1;
    }
    counts
}

pub fn count_by_priority(jobs: &[Job]) -> CountMap {
    let mut counts = zero_filled(JobPriority::ALL.iter().map(|p| p.as_str()));
    for job in jobs {
        *counts.entry(job.priority.as_str().to_string()).or_default() += 1;
    }
    counts
}

fn count_status(jobs: &[Job], status: JobStatus) -> u64 {
    jobs.iter().filter(|j| j.status == status).count() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsOverview {
    pub total_jobs: u64,
    pub parent_jobs: u64,
    pub running: u64,
    pub pending: u64,
    pub by_status: CountMap,
    pub by_type: CountMap,
    pub by_priority: CountMap,
    pub generated_at: DateTime<Utc>,
}

impl StatsOverview {
    pub fn compute(jobs: &[Job], now: DateTime<Utc>) -> Self {
        Self {
            total_jobs: jobs.len() as u64,
            parent_jobs: jobs.iter().filter(|j| j.is_parent_job).count() as u64,
            running: count_status(jobs, JobStatus::Running),
            pending: count_status(jobs, JobStatus::Pending),
            by_status: count_by_status(jobs),
            by_type: count_by_type(jobs),
            by_priority: count_by_priority(jobs),
            generated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour_start: DateTime<Utc>,
    pub completed: u64,
    pub failed: u64,
}

fn empty_buckets(window: HoursWindow, now: DateTime<Utc>) -> Vec<HourBucket> {
    let start = window.start(now);
    (0..window.hours())
        .map(|i| HourBucket {
            hour_start: start + Duration::hours(i64::from(i)),
            completed: 0,
            failed: 0,
        })
        .collect()
}

/// Jobs that reached a terminal status inside the window.
fn finished_within(jobs: &[Job], window: HoursWindow, now: DateTime<Utc>) -> impl Iterator<Item = (&Job, DateTime<Utc>)> {
    jobs.iter().filter_map(move |job| match job.completed_at {
        Some(at) if job.status.is_terminal() && window.contains(at, now) => Some((job, at)),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub window_hours: u32,
    pub total_finished: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// completed / total_finished; 0 when nothing finished.
    pub success_rate: f64,
    pub average_duration_seconds: Option<f64>,
    pub max_duration_seconds: Option<f64>,
    pub hourly: Vec<HourBucket>,
}

impl PerformanceMetrics {
    pub fn compute(jobs: &[Job], window: HoursWindow, now: DateTime<Utc>) -> Self {
        let mut hourly = empty_buckets(window, now);
        let (mut completed, mut failed, mut cancelled) = (0u64, 0u64, 0u64);
        let mut durations = Vec::new();

        for (job, at) in finished_within(jobs, window, now) {
            let bucket = &mut hourly[window.bucket(at, now)];
            match job.status {
                JobStatus::Completed => {
                    completed += 1;
                    bucket.completed += 1;
                    durations.extend(job.duration_seconds());
                }
                JobStatus::Failed => {
                    failed += 1;
                    bucket.failed += 1;
                }
                _ => cancelled += 1,
            }
        }

        let total_finished = completed + failed + cancelled;
        let success_rate = if total_finished == 0 {
            0.0
        } else {
            completed as f64 / total_finished as f64
        };
        let average_duration_seconds =
            (!durations.is_empty()).then(|| durations.iter().sum::<f64>() / durations.len() as f64);
        let max_duration_seconds = durations.iter().copied().reduce(f64::max);

        Self {
            window_hours: window.hours(),
            total_finished,
            completed,
            failed,
            cancelled,
            success_rate,
            average_duration_seconds,
            max_duration_seconds,
            hourly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputBucket {
    pub hour_start: DateTime<Utc>,
    pub completed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub window_hours: u32,
    pub total_completed: u64,
    pub per_hour_average: f64,
    pub buckets: Vec<ThroughputBucket>,
}

impl Throughput {
    pub fn compute(jobs: &[Job], window: HoursWindow, now: DateTime<Utc>) -> Self {
        let start = window.start(now);
        let mut buckets: Vec<ThroughputBucket> = (0..window.hours())
            .map(|i| ThroughputBucket {
                hour_start: start + Duration::hours(i64::from(i)),
                completed: 0,
            })
            .collect();

        let mut total_completed = 0;
        for (job, at) in finished_within(jobs, window, now) {
            if job.status == JobStatus::Completed {
                buckets[window.bucket(at, now)].completed += 1;
                total_completed += 1;
            }
        }

        Self {
            window_hours: window.hours(),
            total_completed,
            per_hour_average: total_completed as f64 / f64::from(window.hours()),
            buckets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job: Job,
    pub running_seconds: Option<f64>,
    /// Advisory: the job has outlived `timeout_seconds`.
    pub timed_out: bool,
}

/// Running jobs, longest-running first.
pub fn active_jobs(jobs: &[Job], now: DateTime<Utc>) -> Vec<ActiveJob> {
    let mut active: Vec<ActiveJob> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Running)
        .map(|j| ActiveJob {
            job: j.clone(),
            running_seconds: j.running_seconds(now),
            timed_out: j.is_timed_out(now),
        })
        .collect();
    active.sort_by(|a, b| {
        (a.job.started_at.is_none(), a.job.started_at, &a.job.id)
            .cmp(&(b.job.started_at.is_none(), b.job.started_at, &b.job.id))
    });
    active
}

/// Failed jobs that finished inside the window, newest first.
pub fn failed_jobs(jobs: &[Job], window: HoursWindow, now: DateTime<Utc>) -> Vec<Job> {
    let mut failed: Vec<Job> = finished_within(jobs, window, now)
        .filter(|(job, _)| job.status == JobStatus::Failed)
        .map(|(job, _)| job.clone())
        .collect();
    failed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    failed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub pending: u64,
    pub retrying: u64,
    /// Pending jobs per priority.
    pub by_priority: CountMap,
}

impl QueueDepth {
    pub fn compute(jobs: &[Job]) -> Self {
        let pending: Vec<Job> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        Self {
            pending: pending.len() as u64,
            retrying: count_status(jobs, JobStatus::Retrying),
            by_priority: count_by_priority(&pending),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub worker_host: Option<String>,
    pub total_jobs: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub last_seen: DateTime<Utc>,
}

/// Per-worker activity, ordered by worker id then host. Jobs without a worker are skipped.
pub fn worker_stats(jobs: &[Job]) -> Vec<WorkerStats> {
    let mut workers: BTreeMap<(String, Option<String>), WorkerStats> = BTreeMap::new();
    for job in jobs {
        let Some(worker_id) = job.worker_id.clone() else {
            continue;
        };
        let entry = workers
            .entry((worker_id.clone(), job.worker_host.clone()))
            .or_insert_with(|| WorkerStats {
                worker_id,
                worker_host: job.worker_host.clone(),
                total_jobs: 0,
                running: 0,
                completed: 0,
                failed: 0,
                last_seen: job.updated_at,
            });
        entry.total_jobs += 1;
        match job.status {
            JobStatus::Running => entry.running += 1,
            JobStatus::Completed => entry.completed += 1,
            JobStatus::Failed => entry.failed += 1,
            _ => {}
        }
        entry.last_seen = entry.last_seen.max(job.updated_at);
    }
    workers.into_values().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Failure ratio over the last hour above which the system reports degraded.
pub const DEGRADED_FAILURE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store_reachable: bool,
    pub live_jobs: u64,
    pub running: u64,
    pub pending: u64,
    pub completed_last_hour: u64,
    pub failed_last_hour: u64,
    pub failure_ratio_last_hour: f64,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn evaluate(jobs: &[Job], now: DateTime<Utc>) -> Self {
        let last_hour = HoursWindow(1);
        let (mut completed, mut failed) = (0u64, 0u64);
        for (job, _) in finished_within(jobs, last_hour, now) {
            match job.status {
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
                _ => {}
            }
        }
        let finished = completed + failed;
        let ratio = if finished == 0 {
            0.0
        } else {
            failed as f64 / finished as f64
        };

        Self {
            status: if ratio > DEGRADED_FAILURE_RATIO {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            store_reachable: true,
            live_jobs: jobs.len() as u64,
            running: count_status(jobs, JobStatus::Running),
            pending: count_status(jobs, JobStatus::Pending),
            completed_last_hour: completed,
            failed_last_hour: failed,
            failure_ratio_last_hour: ratio,
            checked_at: now,
            error: None,
        }
    }

    pub fn unreachable(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            store_reachable: false,
            live_jobs: 0,
            running: 0,
            pending: 0,
            completed_last_hour: 0,
            failed_last_hour: 0,
            failure_ratio_last_hour: 0.0,
            checked_at: now,
            error: Some(error.into()),
        }
    }
}

impl Emptiness for HealthReport {
    fn is_empty_result(&self) -> bool {
        false
    }
}
