//! Process-wide tracing setup shared by the tracking binaries.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize tracing from the environment (`RUST_LOG`, `DJT_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env());
}
