//! Background idle sweeping and shutdown for a [`SandboxPool`].

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pool::{DrainReport, SandboxPool};

/// Owns the sweep loop of a pool and its one-time shutdown.
pub struct PoolLifecycle {
    pool: Arc<SandboxPool>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    drained: Mutex<Option<DrainReport>>,
}

impl PoolLifecycle {
    pub fn new(pool: Arc<SandboxPool>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool,
            shutdown_tx,
            sweeper: Mutex::new(None),
            drained: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &Arc<SandboxPool> {
        &self.pool
    }

    /// Spawn the idle sweeper. Calling it again while running does nothing.
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() || *self.shutdown_tx.borrow() {
            return;
        }

        let pool = self.pool.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = pool.config().sweep_interval();

        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "Idle sweeper started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = pool.sweep_idle().await;
                        if !evicted.is_empty() {
                            tracing::info!(count = evicted.len(), "Idle sandboxes evicted");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Idle sweeper stopped");
        }));
    }

    /// Stop the sweeper, then drain the pool. Only the first call drains;
    /// later calls return the same report.
    pub async fn shutdown(&self) -> DrainReport {
        let mut drained = self.drained.lock().await;
        if let Some(report) = *drained {
            return report;
        }

        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.sweeper.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Idle sweeper ended abnormally");
            }
        }

        let report = self.pool.drain_all().await;
        tracing::info!(
            terminated = report.terminated,
            failed = report.failed,
            "Sandbox pool drained"
        );
        *drained = Some(report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSandbox;
    use codegate_core::config::PoolConfig;
    use codegate_core::Language;
    use std::time::Duration;

    fn lifecycle(mock: Arc<MockSandbox>) -> PoolLifecycle {
        let config = PoolConfig {
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
            ..PoolConfig::default()
        };
        PoolLifecycle::new(Arc::new(SandboxPool::new(mock, config)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_interval() {
        let mock = Arc::new(MockSandbox::new());
        let lifecycle = lifecycle(mock.clone());
        lifecycle.start().await;

        lifecycle.pool().create(Language::Python).await.unwrap();

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(lifecycle.pool().len().await, 1);

        // Next ticks at 300 (idle exactly 300, kept) and 360 (evicted)
        tokio::time::sleep(Duration::from_secs(115)).await;
        assert!(lifecycle.pool().is_empty().await);
        assert_eq!(mock.destroy_count(), 1);

        lifecycle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_once() {
        let mock = Arc::new(MockSandbox::new());
        let lifecycle = lifecycle(mock.clone());
        lifecycle.start().await;

        lifecycle.pool().create(Language::Python).await.unwrap();
        lifecycle.pool().create(Language::JavaScript).await.unwrap();

        let first = lifecycle.shutdown().await;
        let second = lifecycle.shutdown().await;
        assert_eq!(first.terminated, 2);
        assert_eq!(first, second);
        assert_eq!(mock.destroy_count(), 2);
        assert!(!lifecycle.pool().is_accepting());
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_ignored() {
        let lifecycle = lifecycle(Arc::new(MockSandbox::new()));
        lifecycle.shutdown().await;
        lifecycle.start().await;
        assert!(lifecycle.sweeper.lock().await.is_none());
    }
}
