//! Job records: CRUD with tiered retention, and parent/sub-job tree resolution.

pub mod store;
pub mod tree;

pub use store::JobStore;
pub use tree::{JobTree, JobTreeResolver};
