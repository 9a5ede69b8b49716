//! Parent/sub-job tree resolution.

use std::collections::{HashSet, VecDeque};

use djt_core::job::MAX_JOB_TREE_DEPTH;
use djt_core::{Job, JobId, TrackingError, TrackingResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::store::JobStore;

/// A job with its resolved sub-jobs.
///
/// `sub_jobs` holds the direct children. Jobs further down are listed in
/// `descendants` breadth first; each carries its own `parent_job_id`.
/// Sub-jobs that have expired are listed in `missing_sub_job_ids`; a partial
/// tree is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTree {
    pub job: Job,
    pub sub_jobs: Vec<Job>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descendants: Vec<Job>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_sub_job_ids: Vec<JobId>,
}

#[derive(Debug, Clone)]
pub struct JobTreeResolver {
    store: JobStore,
}

impl JobTreeResolver {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Parent/child links are mutable through updates, so cycles are possible;
    /// each job appears at most once.
    #[instrument(skip(self), err)]
    pub async fn get_job_tree(&self, job_id: &JobId) -> TrackingResult<JobTree> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| TrackingError::not_found(format!("job {job_id}")))?;

        let mut visited = HashSet::from([job_id.clone()]);
        let mut queue: VecDeque<(JobId, usize)> = job.sub_job_ids.iter().map(|id| (id.clone(), 2)).collect();
        let mut tree = JobTree {
            job,
            sub_jobs: Vec::new(),
            descendants: Vec::new(),
            missing_sub_job_ids: Vec::new(),
        };

        while let Some((child_id, depth)) = queue.pop_front() {
            if depth > MAX_JOB_TREE_DEPTH {
                debug!(job_id = %child_id, depth, "tree depth limit reached");
                continue;
            }
            if !visited.insert(child_id.clone()) {
                debug!(job_id = %child_id, "sub-job already in tree, skipping");
                continue;
            }
            let Some(child) = self.store.get_job(&child_id).await? else {
                tree.missing_sub_job_ids.push(child_id);
                continue;
            };
            queue.extend(child.sub_job_ids.iter().map(|id| (id.clone(), depth + 1)));
            if depth == 2 {
                tree.sub_jobs.push(child);
            } else {
                tree.descendants.push(child);
            }
        }
        Ok(tree)
    }
}
