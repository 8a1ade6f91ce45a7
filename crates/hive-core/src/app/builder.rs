//! CoordinatorBuilder - コンポーネントの構築とワイヤリング
//!
//! # 方針
//! - 起動時検証（Fail-fast）: 必須設定が欠けていれば `build()` が `BuildError` を返す
//! - ストア・バス・時計・修復プランナは差し替え可能（テストではメモリ実装）
//! - 差し替えがなければ `HiveConfig` からファイルストアを組み立てる

use std::sync::Arc;

use tracing::{debug, info};

use crate::board::TaskBoard;
use crate::config::HiveConfig;
use crate::dispatch::{DispatchLoop, Dispatcher};
use crate::domain::HiveError;
use crate::impls::{FileCapabilityStore, FileTaskStore, InMemoryBus, RoutedDispatch};
use crate::ports::{
    CapabilityStore, Clock, IdGenerator, MessageBus, NoopRepairPlanner, RepairPlanner, SystemClock,
    TaskStore, UlidGenerator,
};
use crate::registry::CapabilityRegistry;
use crate::voting::{VotingCoordinator, VotingLoop};

/// BuildError はワイヤリング時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// CoordinatorBuilder は `Coordinator` を構築
///
/// ```ignore
/// let mut coordinator = CoordinatorBuilder::new(HiveConfig::load_or_default(None)?)
///     .bus(bus)
///     .build()?;
/// coordinator.start().await?;
/// ```
pub struct CoordinatorBuilder {
    config: HiveConfig,
    bus: Option<Arc<dyn MessageBus>>,
    clock: Option<Arc<dyn Clock>>,
    repair: Option<Arc<dyn RepairPlanner>>,
    task_store: Option<Arc<dyn TaskStore>>,
    capability_store: Option<Arc<dyn CapabilityStore>>,
}

impl CoordinatorBuilder {
    pub fn new(config: HiveConfig) -> Self {
        Self {
            config,
            bus: None,
            clock: None,
            repair: None,
            task_store: None,
            capability_store: None,
        }
    }

    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn repair_planner(mut self, repair: Arc<dyn RepairPlanner>) -> Self {
        self.repair = Some(repair);
        self
    }

    /// Use `store` instead of a `FileTaskStore` under `board_dir`.
    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn capability_store(mut self, store: Arc<dyn CapabilityStore>) -> Self {
        self.capability_store = Some(store);
        self
    }

    /// Validate the configuration and wire the components.
    ///
    /// Nothing is started; see `Coordinator::start`.
    pub fn build(self) -> Result<Coordinator, BuildError> {
        let config = self.config;
        if config.dispatch_interval_ms == 0 {
            return Err(BuildError::InvalidConfig(
                "dispatch_interval_ms must be greater than 0".to_string(),
            ));
        }
        if config.lock_timeout_ms == 0 {
            return Err(BuildError::InvalidConfig(
                "lock_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let task_store: Arc<dyn TaskStore> = match self.task_store {
            Some(store) => store,
            None => {
                let dir = config
                    .board_dir
                    .clone()
                    .ok_or(BuildError::MissingConfig("board_dir"))?;
                Arc::new(
                    FileTaskStore::new(dir)
                        .with_lock_timeout(config.lock_timeout())
                        .with_stale_lock_after(config.stale_lock_after()),
                )
            }
        };
        let capability_store: Arc<dyn CapabilityStore> = match self.capability_store {
            Some(store) => store,
            None => {
                let path = config
                    .capability_path()
                    .ok_or(BuildError::MissingConfig("capability_file"))?;
                Arc::new(
                    FileCapabilityStore::new(path)
                        .with_lock_timeout(config.lock_timeout())
                        .with_stale_lock_after(config.stale_lock_after()),
                )
            }
        };

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus: Arc<dyn MessageBus> = self.bus.unwrap_or_else(|| {
            debug!("no message bus configured; using an in-process bus");
            Arc::new(InMemoryBus::new())
        });
        let repair: Arc<dyn RepairPlanner> =
            self.repair.unwrap_or_else(|| Arc::new(NoopRepairPlanner));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));

        let board = Arc::new(TaskBoard::new(task_store, clock.clone(), ids));
        let registry = Arc::new(
            CapabilityRegistry::new(capability_store, clock.clone())
                .with_bus(bus.clone(), config.publish_timeout()),
        );
        let strategy = Arc::new(
            RoutedDispatch::new(registry.clone()).with_fallback(config.fallback_routes.clone()),
        );
        let dispatcher = Arc::new(
            Dispatcher::new(board.clone(), strategy, bus.clone(), repair)
                .with_publish_timeout(config.publish_timeout())
                .with_max_repair_tasks(config.max_repair_tasks),
        );

        Ok(Coordinator {
            config,
            clock,
            bus,
            board,
            registry,
            dispatcher,
            running: None,
        })
    }
}

struct Running {
    dispatch: DispatchLoop,
    voting: VotingLoop,
}

/// Coordinator はワイヤリング済みのコンポーネント一式
///
/// `start()` でキャッシュを読み込みループを起動し、`shutdown()` で両ループの終了まで待つ。
pub struct Coordinator {
    config: HiveConfig,
    clock: Arc<dyn Clock>,
    bus: Arc<dyn MessageBus>,
    board: Arc<TaskBoard>,
    registry: Arc<CapabilityRegistry>,
    dispatcher: Arc<Dispatcher>,
    running: Option<Running>,
}

impl Coordinator {
    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn board(&self) -> &Arc<TaskBoard> {
        &self.board
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Load the capability cache and start the dispatch and voting loops.
    /// Calling it again while running is a no-op.
    pub async fn start(&mut self) -> Result<(), HiveError> {
        if self.running.is_some() {
            return Ok(());
        }

        let capabilities = self.registry.load().await?;
        let dispatch = DispatchLoop::spawn(self.dispatcher.clone(), self.config.dispatch_interval())
            .await
            .map_err(|e| HiveError::DispatchFailure(format!("cannot start dispatch loop: {e}")))?;

        let voting = VotingCoordinator::new(self.bus.clone(), self.clock.clone())
            .with_fallback_duration(self.config.vote_fallback_duration())
            .with_publish_timeout(self.config.publish_timeout());
        let voting = match VotingLoop::spawn(voting).await {
            Ok(voting) => voting,
            Err(err) => {
                dispatch.shutdown_and_join().await;
                return Err(HiveError::DispatchFailure(format!(
                    "cannot start voting loop: {err}"
                )));
            }
        };

        info!(capabilities, "coordinator started");
        self.running = Some(Running { dispatch, voting });
        Ok(())
    }

    /// Stop both loops and wait for them to finish.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.voting.stop().await;
        running.dispatch.shutdown_and_join().await;
        info!("coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_types;
    use crate::impls::{InMemoryCapabilityStore, InMemoryTaskStore};

    #[test]
    fn build_without_board_dir_fails_fast() {
        let result = CoordinatorBuilder::new(HiveConfig::default()).build();
        assert!(matches!(result, Err(BuildError::MissingConfig("board_dir"))));
    }

    #[test]
    fn build_rejects_zero_interval() {
        let mut config = HiveConfig::default().with_board_dir("/tmp/unused");
        config.dispatch_interval_ms = 0;
        let result = CoordinatorBuilder::new(config).build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn injected_stores_need_no_board_dir() {
        let result = CoordinatorBuilder::new(HiveConfig::default())
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .capability_store(Arc::new(InMemoryCapabilityStore::new()))
            .build();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn start_and_shutdown_manage_subscriptions() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let mut coordinator = CoordinatorBuilder::new(HiveConfig::default().with_board_dir(dir.path()))
            .bus(bus.clone())
            .build()
            .unwrap();

        coordinator.start().await.unwrap();
        assert!(coordinator.is_running());
        assert_eq!(bus.subscriber_count(event_types::TASK_RESPONSE).await, 1);
        assert_eq!(bus.subscriber_count(event_types::VOTE_INITIATED).await, 1);

        // 二重起動しても購読は増えない
        coordinator.start().await.unwrap();
        assert_eq!(bus.subscriber_count(event_types::AGENT_VOTE).await, 1);

        coordinator.shutdown().await;
        assert!(!coordinator.is_running());
        assert_eq!(bus.subscriber_count(event_types::TASK_RESPONSE).await, 0);
        assert_eq!(bus.subscriber_count(event_types::AGENT_VOTE).await, 0);
    }
}
