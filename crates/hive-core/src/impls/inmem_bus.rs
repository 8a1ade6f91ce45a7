//! InMemoryBus - 開発・テスト用のメッセージバス
//!
//! # 実装詳細
//! - event_type ごとに購読者（mpsc の送信側）を保持
//! - publish されたメッセージは直近 `log_capacity` 件だけログに残す（テストで検査するため）
//! - 指定した event_type の publish を拒否させて、バス障害を再現できる

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::trace;

use crate::domain::BusMessage;
use crate::ports::{BusError, MessageBus, Subscription};

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<(u64, mpsc::UnboundedSender<BusMessage>)>>,
    published: VecDeque<BusMessage>,
    rejected_types: HashSet<String>,
    closed: bool,
}

/// Published messages kept for inspection by default.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// In-process pub/sub keyed by `message_type`.
pub struct InMemoryBus {
    state: Mutex<BusState>,
    next_id: AtomicU64,
    published: Notify,
    log_capacity: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            next_id: AtomicU64::new(0),
            published: Notify::new(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` published messages; older ones are dropped.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// The most recent published messages, oldest first.
    pub async fn published(&self) -> Vec<BusMessage> {
        self.state.lock().await.published.iter().cloned().collect()
    }

    pub async fn published_of(&self, message_type: &str) -> Vec<BusMessage> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` messages of `message_type` were published.
    pub async fn wait_for(
        &self,
        message_type: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<BusMessage>, BusError> {
        let wait = async {
            loop {
                let notified = self.published.notified();
                let seen = self.published_of(message_type).await;
                if seen.len() >= count {
                    return seen;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BusError::Timeout(timeout))
    }

    /// Make every later publish of `message_type` fail.
    pub async fn reject(&self, message_type: &str) {
        self.state
            .lock()
            .await
            .rejected_types
            .insert(message_type.to_string());
    }

    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        self.state
            .lock()
            .await
            .subscribers
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Drop all subscriptions; later calls fail with `BusError::Closed`.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.subscribers.clear();
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BusError::Closed);
        }
        if state.rejected_types.contains(&message.message_type) {
            return Err(BusError::Rejected(format!(
                "{} publishes are disabled",
                message.message_type
            )));
        }

        if let Some(subscribers) = state.subscribers.get_mut(&message.message_type) {
            // 受信側が落ちた購読は掃除する
            subscribers.retain(|(_, tx)| tx.send(message.clone()).is_ok());
        }
        trace!(
            message_type = %message.message_type,
            recipient = message.recipient.as_deref().unwrap_or("-"),
            "published"
        );
        if self.log_capacity > 0 {
            if state.published.len() >= self.log_capacity {
                state.published.pop_front();
            }
            state.published.push_back(message);
        }
        drop(state);
        self.published.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, event_type: &str) -> Result<Subscription, BusError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BusError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .subscribers
            .entry(event_type.to_string())
            .or_default()
            .push((id, tx));
        Ok(Subscription::new(id, event_type, rx))
    }

    async fn unsubscribe(&self, subscription_id: u64) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        for subscribers in state.subscribers.values_mut() {
            subscribers.retain(|(id, _)| *id != subscription_id);
        }
        Ok(())
    }
}
