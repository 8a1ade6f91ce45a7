//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ファイル / DB ストア、メッセージバス、修復タスク生成など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore / CapabilityStore が source of truth（正本）
//! - capability のメモリキャッシュは正本から再構築できる射影に過ぎない
//! - バスは信頼できる pub/sub プリミティブとして既に存在する前提

pub mod bus;
pub mod capability_store;
pub mod clock;
pub mod dispatch;
pub mod id_generator;
pub mod repair_hint;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::bus::{BusError, MessageBus, Subscription, publish_with_timeout};
pub use self::capability_store::{CapabilityStore, RawCapabilities};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::{CapabilityLookup, DispatchStrategy, Recipient, RecipientSource};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::repair_hint::{NoopRepairPlanner, RepairPlanner};
pub use self::task_store::{AddOutcome, BoardSnapshot, Guard, Mutation, StoreOutcome, TaskStore};
