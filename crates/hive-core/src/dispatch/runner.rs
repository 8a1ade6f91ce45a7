use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::domain::{BusMessage, event_types};
use crate::ports::{BusError, Subscription};

/// Running dispatch loop.
/// - 1 つのタスクがタイマーと TASK_RESPONSE の両方を処理する（サイクルは重ならない）
/// - `shutdown_and_join()` で停止を要求し、ループの終了と購読解除まで待つ
pub struct DispatchLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
    subscription_id: u64,
}

impl DispatchLoop {
    /// Subscribe to `TASK_RESPONSE` and start cycling every `interval`.
    pub async fn spawn(dispatcher: Arc<Dispatcher>, interval: Duration) -> Result<Self, BusError> {
        let subscription = dispatcher
            .bus()
            .subscribe(event_types::TASK_RESPONSE)
            .await?;
        let subscription_id = subscription.id();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(dispatch_loop(
            dispatcher.clone(),
            interval,
            subscription,
            shutdown_rx,
        ));
        info!(interval_ms = interval.as_millis() as u64, "dispatch loop started");

        Ok(Self {
            shutdown_tx,
            join,
            dispatcher,
            subscription_id,
        })
    }

    /// Stop after the cycle in progress, if any.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            warn!(error = %err, "dispatch loop ended abnormally");
        }
        if let Err(err) = self
            .dispatcher
            .bus()
            .unsubscribe(self.subscription_id)
            .await
        {
            debug!(error = %err, "unsubscribe after shutdown failed");
        }
        info!("dispatch loop stopped");
    }
}

async fn dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    subscription: Subscription,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut responses = Some(subscription);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop されたら止める
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = dispatcher.run_cycle().await {
                    warn!(error = %err, "dispatch cycle failed");
                }
            }
            message = next_response(&mut responses) => match message {
                Some(message) => {
                    dispatcher.handle_response(&message).await;
                }
                None => {
                    warn!("task response subscription closed");
                    responses = None;
                }
            },
        }
    }
}

async fn next_response(subscription: &mut Option<Subscription>) -> Option<BusMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
