//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FileTaskStore**: キューごとの JSON + ロックファイル（複数プロセスで共有可能）
//! - **InMemoryTaskStore**: テスト・単一プロセス用
//! - **FileCapabilityStore / InMemoryCapabilityStore**
//! - **InMemoryBus**: 開発・テスト用のメッセージバス
//! - **RoutedDispatch**: デフォルトの DispatchStrategy
//!
//! ネットワーク越しのバスはこのクレートの外で `MessageBus` を実装します。

pub mod capability_stores;
pub mod dispatch;
pub mod file_lock;
pub mod file_task_store;
mod fs_atomic;
pub mod inmem_bus;
pub mod memory_task_store;
mod queue_docs;

// 主要な型を再エクスポート
pub use self::capability_stores::{FileCapabilityStore, InMemoryCapabilityStore};
pub use self::dispatch::{FallbackRoutes, RoutedDispatch};
pub use self::file_lock::LockFile;
pub use self::file_task_store::FileTaskStore;
pub use self::inmem_bus::InMemoryBus;
pub use self::memory_task_store::InMemoryTaskStore;
