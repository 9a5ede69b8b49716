//! JSON encoding of stored hash fields.

use djt_core::{TrackingError, TrackingResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) fn encode<T: Serialize>(value: &T) -> TrackingResult<String> {
    serde_json::to_string(value).map_err(|e| TrackingError::corrupt(format!("encode failed: {e}")))
}

/// Decode a stored field; `location` names the key and field for the error.
pub(crate) fn decode<T: DeserializeOwned>(raw: &str, location: &str) -> TrackingResult<T> {
    serde_json::from_str(raw).map_err(|e| TrackingError::corrupt(format!("{location}: {e}")))
}
