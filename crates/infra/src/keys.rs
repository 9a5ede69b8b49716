//! Store key layout.
//!
//! ```text
//! key:   {prefix}{run_id}
//! field: "job"                    -> JSON(Job)
//! field: "pipeline:{pipeline_id}" -> JSON(PipelineRecord)
//! ```

use djt_core::{JobId, PipelineId};

pub const JOB_FIELD: &str = "job";
pub const PIPELINE_FIELD_PREFIX: &str = "pipeline:";

pub fn pipeline_field(pipeline_id: &PipelineId) -> String {
    format!("{PIPELINE_FIELD_PREFIX}{pipeline_id}")
}

/// The pipeline id carried by a hash field name, if it is a pipeline field.
pub fn pipeline_id_from_field(field: &str) -> Option<&str> {
    field.strip_prefix(PIPELINE_FIELD_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    prefix: String,
}

impl KeySchema {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn run_key(&self, run_id: &JobId) -> String {
        format!("{}{run_id}", self.prefix)
    }

    pub fn run_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}
