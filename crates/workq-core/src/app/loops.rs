//! Background loops launched by `WorkQueue::start`.
//!
//! - ingest: channel → route to group
//! - timer (per discipline): sleep(interval) → dispatch drains
//!
//! どちらも watch channel で shutdown を受け取る。実行中のドレインは止めない。

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use super::work_queue::WorkQueue;
use crate::domain::{Discipline, Submission};

pub(crate) async fn ingest_loop<T: Send + Sync + 'static>(
    queue: WorkQueue<T>,
    mut rx: mpsc::Receiver<Submission<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let received = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            received = rx.recv() => received,
        };

        let Some(submission) = received else {
            debug!("submission channel closed, ingest loop exiting");
            break;
        };
        queue.route(submission);
    }
}

pub(crate) async fn timer_loop<T: Send + Sync + 'static>(
    queue: WorkQueue<T>,
    discipline: Discipline,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Re-read every round so set_drain_interval applies from the next tick.
        let interval = queue.drain_interval();
        tokio::select! {
            _ = shutdown_rx.changed() => continue,
            _ = tokio::time::sleep(interval) => {}
        }

        let dispatched = queue.dispatch(discipline);
        trace!(%discipline, dispatched, "tick");
    }
}
