//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **WorkQueue**: group の振り分けと定期ドレイン
//! - **WorkQueueBuilder**: 設定の検証と構築
//! - **Submitter**: 投入 channel の送信側
//! - **loops**: ingest / ordered timer / randomized timer

pub mod builder;
pub mod config;
mod loops;
pub mod submitter;
pub mod work_queue;

// 主要な型を再エクスポート
pub use self::builder::WorkQueueBuilder;
pub use self::config::WorkQueueConfig;
pub use self::submitter::Submitter;
pub use self::work_queue::WorkQueue;
