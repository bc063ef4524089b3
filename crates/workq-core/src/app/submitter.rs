//! Submitter - 投入用 channel の送信側ハンドル
//!
//! 有界 channel なので、満杯なら `submit` は空きが出るまで待つ（backpressure）。

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::error;

use crate::domain::{Discipline, Entry, Submission};
use crate::error::WorkQueueError;

/// Cloneable sending side of a work queue's submission channel.
pub struct Submitter<T> {
    tx: mpsc::Sender<Submission<T>>,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Submitter<T> {
    pub(crate) fn new(tx: mpsc::Sender<Submission<T>>) -> Self {
        Self { tx }
    }

    /// Send a submission, waiting while the channel is full.
    pub async fn submit(&self, submission: Submission<T>) -> Result<(), WorkQueueError> {
        self.tx
            .send(submission)
            .await
            .map_err(|_| WorkQueueError::Closed)
    }

    /// Send without waiting. Fails with `Full` when the channel has no room.
    pub fn try_submit(&self, submission: Submission<T>) -> Result<(), WorkQueueError> {
        self.tx.try_send(submission).map_err(|err| match err {
            TrySendError::Full(_) => WorkQueueError::Full,
            TrySendError::Closed(_) => WorkQueueError::Closed,
        })
    }

    /// Send with the discipline given as a raw tag (`"ordered"`, `"rand"`, `"0"`, ...).
    ///
    /// An unknown tag is logged and the submission is dropped; the caller
    /// still gets `Ok(())`.
    pub async fn submit_tagged(
        &self,
        tag: &str,
        group: impl Into<String>,
        entry: Entry<T>,
    ) -> Result<(), WorkQueueError> {
        let group = group.into();
        match tag.parse::<Discipline>() {
            Ok(discipline) => {
                self.submit(Submission::from_entry(discipline, group, entry))
                    .await
            }
            Err(err) => {
                error!(%group, entry = %entry.id(), error = %err, "dropping submission");
                Ok(())
            }
        }
    }

    /// Free slots in the channel right now.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
