//! Drain report: what one drain pass did.

use serde::{Deserialize, Serialize};

/// Counts collected by a single drain.
///
/// - Ordered: `retried` counts tight in-drain retries; `halted` is set whenever a
///   terminal failure ended the pass, even if nothing was queued behind it.
/// - Randomized: `retried` counts entries deferred to the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Action invocations.
    pub attempted: usize,

    pub succeeded: usize,

    /// Terminal failures (completion reported as `false`).
    pub failed: usize,

    pub retried: usize,

    /// Entries dropped because they had no action.
    pub discarded: usize,

    pub halted: bool,
}

impl DrainReport {
    /// Nothing ran.
    pub fn is_idle(&self) -> bool {
        self.attempted == 0 && self.discarded == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_idle() {
        assert!(DrainReport::default().is_idle());
        let report = DrainReport {
            discarded: 1,
            ..DrainReport::default()
        };
        assert!(!report.is_idle());
    }
}
