//! Periodic escalation sweeps

use crate::config::SchedulerConfig;
use approval_engine::{ApprovalEngine, ApprovalResult, EscalationMonitor};
use approval_types::AssignmentId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Drives the escalation monitor on a fixed interval
pub struct EscalationScheduler {
    config: SchedulerConfig,
    monitor: EscalationMonitor,
    sweep_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl EscalationScheduler {
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<ApprovalEngine>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (sweep_tx, sweep_rx) = mpsc::channel(10);
        let monitor = EscalationMonitor::new(engine).with_batch_size(config.sweep_batch_size);

        let scheduler = Arc::new(Self {
            config,
            monitor,
            sweep_tx,
            running: Arc::new(RwLock::new(false)),
        });

        (scheduler, sweep_rx)
    }

    /// Request a sweep outside the regular interval
    pub async fn trigger_sweep(&self) {
        let _ = self.sweep_tx.send(()).await;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run the sweep loop until [`EscalationScheduler::stop`] is called
    pub async fn start(self: Arc<Self>, mut sweep_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            interval_secs = self.config.sweep_interval_secs,
            batch_size = self.config.sweep_batch_size,
            "Escalation scheduler started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Escalation sweep failed");
                    }
                }
                Some(_) = sweep_rx.recv() => {
                    if !self.is_running().await {
                        break;
                    }
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Triggered escalation sweep failed");
                    }
                }
                else => break,
            }

            if !self.is_running().await {
                break;
            }
        }

        tracing::info!("Escalation scheduler stopped");
    }

    /// Stop the loop; it exits before its next sweep
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            *running = false;
        }
        // Wake the loop so it notices without waiting for the next tick
        let _ = self.sweep_tx.try_send(());
    }

    /// Run one sweep now
    pub async fn sweep_once(&self) -> ApprovalResult<Vec<AssignmentId>> {
        let escalated = self.monitor.sweep(Utc::now()).await?;
        tracing::debug!(escalated = escalated.len(), "Escalation sweep finished");
        Ok(escalated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_engine::{EngineConfig, StaticDirectory};
    use approval_storage::InMemoryApprovalStorage;

    fn scheduler(interval_secs: u64) -> (Arc<EscalationScheduler>, mpsc::Receiver<()>) {
        let engine = Arc::new(ApprovalEngine::new(
            Arc::new(InMemoryApprovalStorage::new()),
            Arc::new(StaticDirectory::new()),
            EngineConfig::default(),
        ));
        EscalationScheduler::new(
            SchedulerConfig {
                sweep_interval_secs: interval_secs,
                sweep_batch_size: 10,
            },
            engine,
        )
    }

    #[tokio::test]
    async fn sweep_on_empty_storage_escalates_nothing() {
        let (scheduler, _rx) = scheduler(300);
        assert!(scheduler.sweep_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let (scheduler, rx) = scheduler(3600);
        let handle = tokio::spawn(scheduler.clone().start(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_running().await);
        scheduler.trigger_sweep().await;

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(!scheduler.is_running().await);
    }
}
