//! Logging setup and status views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::Discipline;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Point-in-time view of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub name: String,
    pub discipline: Discipline,
    pub pending: usize,
    /// Advisory; may already be stale.
    pub draining: bool,
    pub gated: bool,
    pub last_drain_at: Option<DateTime<Utc>>,
}
