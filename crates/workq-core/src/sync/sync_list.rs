//! SyncList - thread-safe double-ended list.
//!
//! Every operation takes the internal lock for its whole duration, so
//! operations are atomic with respect to each other. No lock is ever held
//! across an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A deque guarded by its own mutex.
#[derive(Debug)]
pub struct SyncList<E> {
    items: Mutex<VecDeque<E>>,
}

impl<E> SyncList<E> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<E>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_back(&self, item: E) {
        self.lock().push_back(item);
    }

    pub fn push_front(&self, item: E) {
        self.lock().push_front(item);
    }

    pub fn pop_front(&self) -> Option<E> {
        self.lock().pop_front()
    }

    pub fn pop_back(&self) -> Option<E> {
        self.lock().pop_back()
    }

    /// Move everything in `other` to the tail of `self`, keeping its order.
    pub fn splice_back_from(&self, other: &SyncList<E>) {
        if let Some((mut this, mut other)) = self.lock_pair(other) {
            this.append(&mut other);
        }
    }

    /// Move everything in `other` to the head of `self`, keeping its order.
    pub fn splice_front_from(&self, other: &SyncList<E>) {
        if let Some((mut this, mut other)) = self.lock_pair(other) {
            let mut moved = std::mem::take(&mut *other);
            moved.append(&mut this);
            *this = moved;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove and return every item, front to back.
    pub fn drain_all(&self) -> Vec<E> {
        self.lock().drain(..).collect()
    }

    /// Lock `self` and `other` together, always in address order.
    ///
    /// Returns `None` when both are the same list.
    #[allow(clippy::type_complexity)]
    fn lock_pair<'a>(
        &'a self,
        other: &'a SyncList<E>,
    ) -> Option<(MutexGuard<'a, VecDeque<E>>, MutexGuard<'a, VecDeque<E>>)> {
        let this_addr = self as *const Self as usize;
        let other_addr = other as *const Self as usize;
        if this_addr == other_addr {
            return None;
        }
        if this_addr < other_addr {
            let this = self.lock();
            let other = other.lock();
            Some((this, other))
        } else {
            let other = other.lock();
            let this = self.lock();
            Some((this, other))
        }
    }
}

impl<E> Default for SyncList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FromIterator<E> for SyncList<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
        }
    }
}
