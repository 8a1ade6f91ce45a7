//! hive-core
//!
//! Core building blocks for coordinating a pool of agents.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, capability, vote, events, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, CapabilityStore, MessageBus, DispatchStrategy, など）
//! - **impls**: 実装（FileTaskStore, InMemoryBus, RoutedDispatch など）
//! - **board**: 4 キューのタスクボード（backlog → ready → working → completed）
//! - **registry**: エージェントの capability レジストリ（キャッシュ付き）
//! - **dispatch**: 依存関係・優先度を考慮したディスパッチループ
//! - **voting**: quorum 方式の投票コーディネータ
//! - **app**: 設定からのワイヤリングと起動・停止
//! - **config**: 設定ファイルと環境変数
//! - **observability**: ボードの集計ビュー

pub mod app;
pub mod board;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod registry;
pub mod voting;

pub use app::{BuildError, Coordinator, CoordinatorBuilder};
pub use board::TaskBoard;
pub use config::HiveConfig;
pub use dispatch::{CycleReport, DispatchLoop, Dispatcher};
pub use domain::{HiveError, Result};
pub use observability::BoardCounts;
pub use registry::CapabilityRegistry;
pub use voting::{VotingCoordinator, VotingLoop};
