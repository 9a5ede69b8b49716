//! HTTP client for the tracking API, used by task executors.
//!
//! Every call runs under a [`RetryPolicy`] (3 attempts, 1s initial delay by
//! default). Only transport failures and 5xx responses are retried.

pub mod client;
pub mod error;

pub use client::TrackingClient;
pub use djt_core::RetryPolicy;
pub use error::ClientError;
