//! Opaque string identifiers for jobs and pipelines.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackingError;

/// Upper bound on identifier length; ids end up inside store keys.
pub const MAX_ID_LEN: usize = 256;

/// Identifier of a job. A top-level job's id doubles as the run id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

/// Identifier of a pipeline, unique within its run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PipelineId(String);

/// Alias used where a job id is addressed as the owner of pipelines.
pub type RunId = JobId;

fn validate_id(name: &str, raw: &str) -> Result<(), TrackingError> {
    if raw.trim().is_empty() {
        return Err(TrackingError::validation(format!("{name} must not be empty")));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(TrackingError::validation(format!(
            "{name} must be at most {MAX_ID_LEN} bytes"
        )));
    }
    if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(TrackingError::validation(format!(
            "{name} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

macro_rules! impl_string_id {
    ($t:ident, $name:literal) => {
        impl $t {
            /// Generate a fresh identifier (UUIDv7, time-ordered).
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn parse(raw: impl Into<String>) -> Result<Self, TrackingError> {
                let raw = raw.into();
                validate_id($name, &raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $t {
            type Error = TrackingError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = TrackingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(JobId, "job id");
impl_string_id!(PipelineId, "pipeline id");
