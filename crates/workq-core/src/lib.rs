//! workq-core
//!
//! In-process work queue partitioned into named groups and drained on a timer.
//!
//! # モジュール構成
//! - **sync**: TryMutex（待たない排他）と SyncList（同期両端キュー）
//! - **domain**: Discipline, Entry, Submission, ids
//! - **queue**: Group と 2 つのドレインアルゴリズム（ordered / randomized）
//! - **app**: WorkQueue（振り分け + タイマー）, builder, config, submitter
//! - **observability**: tracing の初期化と GroupStats
//! - **error**: エラー型
//!
//! # 使用例
//! ```ignore
//! let queue: WorkQueue<Delivery> = WorkQueue::builder()
//!     .drain_interval(Duration::from_secs(1))
//!     .build()?;
//! queue.start();
//!
//! queue
//!     .submitter()
//!     .submit(
//!         Submission::ordered("tenant-42", delivery)
//!             .action_fn(|d| async move { d.send().await })
//!             .retry(|d| d.attempts() < 5),
//!     )
//!     .await?;
//! ```

pub mod app;
pub mod domain;
pub mod error;
pub mod observability;
pub mod queue;
pub mod sync;

pub use app::{Submitter, WorkQueue, WorkQueueBuilder, WorkQueueConfig};
pub use domain::{Action, Discipline, Entry, Submission, action_fn};
pub use error::{ActionError, BuildError, ConfigError, WorkQueueError};
pub use queue::{DrainReport, Group};
