//! Entry - group のキューに積まれる 1 単位の仕事
//!
//! # 学習ポイント
//! - async_trait による非同期 Action trait
//! - クロージャを trait object に包む adapter（FnAction）
//! - Arc で共有するので retry で積み直しても clone は安い

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ids::EntryId;
use crate::error::ActionError;

/// Work run against a task by a drain.
///
/// # 使用例
/// ```ignore
/// struct Deliver;
///
/// #[async_trait]
/// impl Action<Message> for Deliver {
///     async fn run(&self, task: Arc<Message>) -> Result<(), ActionError> {
///         send(&task).await.map_err(|e| ActionError::new(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Action<T>: Send + Sync {
    async fn run(&self, task: Arc<T>) -> Result<(), ActionError>;
}

/// Adapter turning an async closure into an [`Action`].
pub struct FnAction<F>(F);

#[async_trait]
impl<T, F, Fut> Action<T> for FnAction<F>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    async fn run(&self, task: Arc<T>) -> Result<(), ActionError> {
        (self.0)(task).await
    }
}

/// Wrap a closure returning a future as a shareable action.
pub fn action_fn<T, F, Fut>(f: F) -> Arc<dyn Action<T>>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Arc::new(FnAction(f))
}

/// Decides whether a failed task gets another attempt. `true` means retry.
pub type RetryPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Called once per terminal outcome with `(task, succeeded)`.
pub type CompletionCallback<T> = Arc<dyn Fn(&T, bool) + Send + Sync>;

/// Result of running one entry once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// The entry carried no action and was dropped.
    NoAction,
    Succeeded,
    /// Failed and the retry predicate asked for another attempt.
    Retry,
    /// Failed for good; completion was reported as `false`.
    Failed,
}

/// One unit of work inside a group's queue.
pub struct Entry<T> {
    id: EntryId,
    task: Arc<T>,
    action: Option<Arc<dyn Action<T>>>,
    retry: Option<RetryPredicate<T>>,
    on_complete: Option<CompletionCallback<T>>,
}

impl<T: Send + Sync + 'static> Entry<T> {
    /// Entry without an action. Drains discard it unless one is attached.
    pub fn new(task: T) -> Self {
        Self::from_arc(Arc::new(task))
    }

    pub fn from_arc(task: Arc<T>) -> Self {
        Self {
            id: EntryId::generate(),
            task,
            action: None,
            retry: None,
            on_complete: None,
        }
    }

    pub fn with_action(mut self, action: Arc<dyn Action<T>>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_action_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.with_action(action_fn(f))
    }

    pub fn with_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.retry = Some(Arc::new(predicate));
        self
    }

    pub fn with_on_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn(&T, bool) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub(crate) fn without_on_complete(mut self) -> Self {
        self.on_complete = None;
        self
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn task(&self) -> &Arc<T> {
        &self.task
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn has_on_complete(&self) -> bool {
        self.on_complete.is_some()
    }

    /// Run the action once and settle what happens next.
    ///
    /// The completion callback fires here for `Succeeded` and `Failed`;
    /// on `Retry` the caller decides where the entry goes.
    pub(crate) async fn attempt(&self) -> Attempt {
        let Some(action) = &self.action else {
            return Attempt::NoAction;
        };

        match action.run(Arc::clone(&self.task)).await {
            Ok(()) => {
                self.complete(true);
                Attempt::Succeeded
            }
            Err(err) => {
                debug!(entry = %self.id, error = %err, "action failed");
                match &self.retry {
                    Some(retry) if retry(&*self.task) => return Attempt::Retry,
                    Some(_) => warn!(entry = %self.id, "retry declined, giving up"),
                    None => {}
                }
                self.complete(false);
                Attempt::Failed
            }
        }
    }

    fn complete(&self, succeeded: bool) {
        if let Some(on_complete) = &self.on_complete {
            on_complete(&*self.task, succeeded);
        }
    }
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            task: Arc::clone(&self.task),
            action: self.action.clone(),
            retry: self.retry.clone(),
            on_complete: self.on_complete.clone(),
        }
    }
}

impl<T> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("action", &self.action.is_some())
            .field("retry", &self.retry.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
