//! TryMutex - non-blocking mutual exclusion for group drains.
//!
//! # 実装詳細
//! - `AtomicBool` が「保持中」フラグ
//! - `Notify` で release を待っている acquire を起こす
//! - Guard の drop で release（二重 release は型で不可能）

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// An exclusive lock that can be tried without waiting.
///
/// Not re-entrant: a holder awaiting `acquire` on the same mutex never wakes.
#[derive(Debug, Default)]
pub struct TryMutex {
    held: AtomicBool,
    released: Notify,
}

impl TryMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the lock is held by the caller.
    pub async fn acquire(&self) -> TryMutexGuard<'_> {
        loop {
            // Register interest before trying so a release in between is not missed.
            let released = self.released.notified();
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            released.await;
        }
    }

    /// Take the lock if it is free. Returns `None` immediately when it is held.
    pub fn try_acquire(&self) -> Option<TryMutexGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TryMutexGuard { mutex: self })
    }

    /// Advisory only: the answer can be stale as soon as it is returned.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
        self.released.notify_one();
    }
}

/// Holding this guard means holding the lock.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock immediately"]
pub struct TryMutexGuard<'a> {
    mutex: &'a TryMutex,
}

impl TryMutexGuard<'_> {
    /// Release explicitly. Same as dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TryMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
