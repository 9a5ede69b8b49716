//! Query and path extraction helpers.

use axum::response::Response;
use serde::Deserialize;

use djt_core::{HoursWindow, JobId, PipelineId};

use crate::app::errors;

#[derive(Debug, Default, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<u32>,
}

impl HoursQuery {
    /// Out-of-range values are rejected, never clamped.
    pub fn window(&self) -> Result<HoursWindow, Response> {
        match self.hours {
            None => Ok(HoursWindow::default()),
            Some(hours) => HoursWindow::new(hours).map_err(errors::tracking_error_to_response),
        }
    }
}

pub fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    JobId::parse(raw).map_err(errors::tracking_error_to_response)
}

pub fn parse_pipeline_id(raw: &str) -> Result<PipelineId, Response> {
    PipelineId::parse(raw).map_err(errors::tracking_error_to_response)
}
