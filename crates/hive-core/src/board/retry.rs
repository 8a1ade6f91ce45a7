//! Busy retry policy: backoff for operations that lost the board lock.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::domain::{ErrorKind, HiveError};

/// Exponential backoff applied only to `HiveError::Busy`.
///
/// Every other error is returned at once.
#[derive(Debug, Clone)]
pub struct BusyRetry {
    /// Delay after the first busy failure.
    pub base_delay: Duration,
    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for BusyRetry {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl BusyRetry {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// With the defaults: 50ms, 100ms, 200ms, 400ms.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }

    /// Run `op` until it succeeds, fails with a non-busy error, or attempts
    /// run out. The last busy error is returned in that case.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, HiveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HiveError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Err(err) if err.kind() == ErrorKind::Transient && attempts < self.max_attempts => {
                    let delay = self.next_delay(attempts);
                    debug!(attempts, delay_ms = delay.as_millis() as u64, error = %err, "board busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
