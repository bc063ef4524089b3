//! Domain model (ids, disciplines, entries, submissions).

pub mod discipline;
pub mod entry;
pub mod ids;
pub mod submission;

pub use self::discipline::Discipline;
pub use self::entry::{Action, CompletionCallback, Entry, FnAction, RetryPredicate, action_fn};
pub use self::ids::{DrainId, EntryId};
pub use self::submission::Submission;
