//! Discipline - どの group map / drain アルゴリズムで処理するか

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkQueueError;

/// Execution strategy a submission declares.
///
/// - `Ordered`: strict queue order, tight retry, halt on a terminal failure.
/// - `Randomized`: whole batch fans out concurrently, retries wait for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    Ordered,
    Randomized,
}

impl Discipline {
    /// Integer tag for `Ordered` on raw submission paths.
    pub const ORDER_TAG: i64 = 0;

    /// Integer tag for `Randomized` on raw submission paths.
    pub const RAND_TAG: i64 = 1;

    pub fn as_str(self) -> &'static str {
        match self {
            Discipline::Ordered => "ordered",
            Discipline::Randomized => "randomized",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for Discipline {
    type Error = WorkQueueError;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        match tag {
            Self::ORDER_TAG => Ok(Discipline::Ordered),
            Self::RAND_TAG => Ok(Discipline::Randomized),
            other => Err(WorkQueueError::UnknownDiscipline(other.to_string())),
        }
    }
}

impl FromStr for Discipline {
    type Err = WorkQueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" | "order" | "0" => Ok(Discipline::Ordered),
            "randomized" | "rand" | "1" => Ok(Discipline::Randomized),
            _ => Err(WorkQueueError::UnknownDiscipline(s.to_string())),
        }
    }
}
