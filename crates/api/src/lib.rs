//! HTTP API for job and pipeline tracking.

pub mod app;
pub mod config;
pub mod middleware;
