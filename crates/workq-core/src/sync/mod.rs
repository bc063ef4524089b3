//! Sync - group 単位のキューとドレインを支える同期プリミティブ
//!
//! - **TryMutex**: 待たずに取得を試せる排他ロック（ドレインの重複防止）
//! - **SyncList**: 両端キュー + 別リストの一括 splice

mod sync_list;
mod try_mutex;

pub use self::sync_list::SyncList;
pub use self::try_mutex::{TryMutex, TryMutexGuard};
