//! Background Expiry Sweeper
//!
//! Every read and write path already treats an entry with a passed
//! deadline as absent ("lazy expiry"), so the sweeper exists purely to
//! reclaim memory: a key that expires and is never touched again would
//! otherwise sit in its shard forever.
//!
//! ## Schedule
//!
//! The sweeper runs as a tokio task:
//! 1. Sleeps for the current interval
//! 2. Wakes and sweeps every shard, removing entries past their deadline
//! 3. Adapts the interval to the observed expiry rate
//!
//! The interval is clamped between [`ExpiryConfig::min_interval`] and
//! [`ExpiryConfig::max_interval`]; the 1 second ceiling guarantees at
//! least one sweep per second while the server runs. The shutdown signal
//! is observed during the sleep, so the task exits within one tick.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Tuning knobs for the sweeper schedule.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps.
    pub base_interval: Duration,

    /// Floor for the interval when many keys are expiring.
    pub min_interval: Duration,

    /// Ceiling for the interval; also the maximum delay before an
    /// expired entry is physically removed.
    pub max_interval: Duration,

    /// Above this expired/live ratio, sweep more often.
    pub speedup_threshold: f64,

    /// Below this expired/live ratio, sweep less often.
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// Handle to the running sweeper task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper over `engine` and returns its handle.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flintkv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    /// // ... server runs ...
    /// drop(sweeper); // stops the task
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.live_keys();
        let expired = engine.cleanup_expired();

        if keys_before > 0 {
            let expiry_rate = expired as f64 / keys_before as f64;

            if expiry_rate > config.speedup_threshold {
                current_interval = (current_interval / 2).max(config.min_interval);
                debug!(
                    expired = expired,
                    rate = %format!("{:.2}%", expiry_rate * 100.0),
                    new_interval_ms = current_interval.as_millis(),
                    "high expiry rate, sweeping more often"
                );
            } else if expiry_rate < config.slowdown_threshold && expired == 0 {
                current_interval = (current_interval * 2).min(config.max_interval);
                trace!(
                    new_interval_ms = current_interval.as_millis(),
                    "low expiry rate, backing off"
                );
            }
        }

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.live_keys(),
                "expired entries reclaimed"
            );
        }
    }
}

/// Starts the sweeper with the default schedule.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweeper_reclaims_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set(
                Bytes::from(format!("key{}", i)),
                Bytes::from("value"),
                Some(Duration::from_millis(50)),
            );
        }
        engine.set(Bytes::from("persistent"), Bytes::from("value"), None);

        assert_eq!(engine.live_keys(), 11);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.live_keys(), 1);
        assert!(engine.exists(&Bytes::from("persistent")));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Sweeper handle dropped here.
        }

        engine.set(
            Bytes::from("key"),
            Bytes::from("value"),
            Some(Duration::from_millis(10)),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Not physically reclaimed, but logically absent on read.
        assert_eq!(engine.get(&Bytes::from("key")), Ok(None));
    }

    #[tokio::test]
    async fn test_sweeper_handles_mixed_variants() {
        let engine = Arc::new(StorageEngine::new());

        engine.set(
            Bytes::from("s"),
            Bytes::from("v"),
            Some(Duration::from_millis(20)),
        );
        engine
            .rpush(Bytes::from("L"), vec![Bytes::from("a")])
            .unwrap();
        engine.expire(&Bytes::from("L"), 1000);
        engine
            .sadd(Bytes::from("set"), vec![Bytes::from("m")])
            .unwrap();

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Only the short-lived string is gone.
        assert_eq!(engine.live_keys(), 2);
        assert!(engine.exists(&Bytes::from("L")));
        assert!(engine.exists(&Bytes::from("set")));
    }
}
