//! Submission - 呼び出し側が channel に流す仕事の単位

use std::future::Future;
use std::sync::Arc;

use super::discipline::Discipline;
use super::entry::{Action, Entry};
use crate::error::ActionError;

/// A unit of work plus routing information.
///
/// `discipline` and `group` are consumed by routing; the rest becomes the
/// queued [`Entry`].
///
/// # 使用例
/// ```ignore
/// let submission = Submission::ordered("billing", invoice)
///     .action_fn(|invoice| async move { push(&invoice).await })
///     .retry(|invoice| invoice.bump_attempts() < 5)
///     .on_complete(|invoice, ok| report(invoice, ok));
/// submitter.submit(submission).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Submission<T> {
    discipline: Discipline,
    group: String,
    entry: Entry<T>,
}

impl<T: Send + Sync + 'static> Submission<T> {
    pub fn new(discipline: Discipline, group: impl Into<String>, task: T) -> Self {
        Self::from_entry(discipline, group, Entry::new(task))
    }

    pub fn from_entry(discipline: Discipline, group: impl Into<String>, entry: Entry<T>) -> Self {
        Self {
            discipline,
            group: group.into(),
            entry,
        }
    }

    pub fn ordered(group: impl Into<String>, task: T) -> Self {
        Self::new(Discipline::Ordered, group, task)
    }

    pub fn randomized(group: impl Into<String>, task: T) -> Self {
        Self::new(Discipline::Randomized, group, task)
    }

    pub fn action(mut self, action: Arc<dyn Action<T>>) -> Self {
        self.entry = self.entry.with_action(action);
        self
    }

    pub fn action_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.entry = self.entry.with_action_fn(f);
        self
    }

    pub fn retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.entry = self.entry.with_retry(predicate);
        self
    }

    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn(&T, bool) + Send + Sync + 'static,
    {
        self.entry = self.entry.with_on_complete(callback);
        self
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn entry(&self) -> &Entry<T> {
        &self.entry
    }

    /// Split into the group name and the entry to queue.
    ///
    /// With `forward_completion == false` the completion callback is dropped.
    pub(crate) fn into_routed(self, forward_completion: bool) -> (Discipline, String, Entry<T>) {
        let entry = if forward_completion {
            self.entry
        } else {
            self.entry.without_on_complete()
        };
        (self.discipline, self.group, entry)
    }
}
