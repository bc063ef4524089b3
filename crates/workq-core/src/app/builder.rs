//! WorkQueueBuilder - WorkQueue の構築
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 容量 0 や間隔 0 は build() で弾く

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use super::config::WorkQueueConfig;
use super::work_queue::WorkQueue;
use crate::error::BuildError;

/// Builds a [`WorkQueue`].
///
/// # 使用例
/// ```ignore
/// let queue: WorkQueue<Message> = WorkQueue::builder()
///     .drain_interval(Duration::from_millis(200))
///     .channel_capacity(128)
///     .build()?;
/// queue.start();
/// ```
///
/// The task type is fixed here so `WorkQueue::builder()` can infer it from
/// the binding that receives `build()`.
pub struct WorkQueueBuilder<T> {
    config: WorkQueueConfig,
    _task: PhantomData<fn() -> T>,
}

impl<T> Default for WorkQueueBuilder<T> {
    fn default() -> Self {
        Self {
            config: WorkQueueConfig::default(),
            _task: PhantomData,
        }
    }
}

impl<T> Clone for WorkQueueBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            _task: PhantomData,
        }
    }
}

impl<T> fmt::Debug for WorkQueueBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueueBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Send + Sync + 'static> WorkQueueBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once (e.g. from `WorkQueueConfig::from_env`).
    pub fn config(mut self, config: WorkQueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.config.drain_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn forward_completion_callbacks(mut self, forward: bool) -> Self {
        self.config.forward_completion_callbacks = forward;
        self
    }

    /// Validate the settings and create the queue. Loops start with `WorkQueue::start`.
    pub fn build(self) -> Result<WorkQueue<T>, BuildError> {
        if self.config.channel_capacity == 0 {
            return Err(BuildError::ZeroChannelCapacity);
        }
        if self.config.drain_interval_ms == 0 {
            return Err(BuildError::ZeroDrainInterval);
        }
        Ok(WorkQueue::from_config(&self.config))
    }
}
