//! MessageBus port - pub/sub の抽象化
//!
//! バス自体（ネットワーク転送）はこのクレートの外にある前提です。
//! コアは `publish` / `subscribe` / `unsubscribe` の 3 操作だけを使います。
//!
//! # 設計原則
//! - subscribe はハンドラ登録ではなく受信チャネルを返す（ループ側で select! できる）
//! - すべての呼び出しは呼び出し側でタイムアウトを掛ける（`publish_with_timeout`）

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::BusMessage;

/// BusError はバス操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("bus closed")]
    Closed,

    #[error("bus operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Handle returned by `MessageBus::subscribe`.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    event_type: String,
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscription {
    pub fn new(
        id: u64,
        event_type: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<BusMessage>,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Next message, or `None` once the bus dropped this subscription.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Already-delivered message, without waiting.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    async fn subscribe(&self, event_type: &str) -> Result<Subscription, BusError>;

    async fn unsubscribe(&self, subscription_id: u64) -> Result<(), BusError>;
}

/// Publish with an upper bound on how long the bus may take.
pub async fn publish_with_timeout(
    bus: &dyn MessageBus,
    message: BusMessage,
    timeout: Duration,
) -> Result<(), BusError> {
    match tokio::time::timeout(timeout, bus.publish(message)).await {
        Ok(result) => result,
        Err(_) => Err(BusError::Timeout(timeout)),
    }
}
