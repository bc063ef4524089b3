//! Queue module: per-group queues and the two drain algorithms.

mod group;
mod report;

pub use group::{Group, StartGate};
pub use report::DrainReport;
