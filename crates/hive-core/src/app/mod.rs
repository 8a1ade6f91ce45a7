//! App - アプリケーション層
//!
//! ports と各コンポーネントを組み合わせ、起動・停止できる形にまとめます。
//!
//! # 主要コンポーネント
//! - **CoordinatorBuilder**: 設定からの構築とワイヤリング（Fail-fast）
//! - **Coordinator**: TaskBoard / CapabilityRegistry / Dispatcher / 投票ループのハンドル

pub mod builder;

pub use self::builder::{BuildError, Coordinator, CoordinatorBuilder};
