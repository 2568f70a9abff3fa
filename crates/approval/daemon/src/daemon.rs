//! Daemon assembly: storage, engine, workflow install and the sweep loop

use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::hooks::{LogCallback, LogNotifier};
use crate::scheduler::EscalationScheduler;
use crate::workflows;
use approval_engine::ApprovalEngine;
use approval_storage::{ApprovalStorage, InMemoryApprovalStorage};
use std::sync::Arc;

/// approvald daemon
pub struct Daemon {
    config: DaemonConfig,
    engine: Arc<ApprovalEngine>,
    scheduler: Arc<EscalationScheduler>,
    sweep_rx: Option<tokio::sync::mpsc::Receiver<()>>,
}

impl Daemon {
    /// Connect storage, warm the definition cache and install the
    /// configured workflow file
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage = build_storage(&config.storage).await?;

        let engine = Arc::new(
            ApprovalEngine::new(
                storage,
                Arc::new(config.directory.clone()),
                config.engine.clone(),
            )
            .with_notifier(Arc::new(LogNotifier))
            .with_callback(Arc::new(LogCallback)),
        );

        let loaded = engine.load_definitions().await?;
        tracing::info!(definitions = loaded, "Workflow definitions loaded from storage");

        if let Some(path) = &config.workflows_path {
            let definitions = workflows::read_workflow_file(path)?;
            workflows::install(&engine, definitions).await?;
        }

        let (scheduler, sweep_rx) =
            EscalationScheduler::new(config.scheduler.clone(), engine.clone());

        Ok(Self {
            config,
            engine,
            scheduler,
            sweep_rx: Some(sweep_rx),
        })
    }

    pub fn engine(&self) -> &Arc<ApprovalEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<EscalationScheduler> {
        &self.scheduler
    }

    /// Run the sweep loop until a shutdown signal arrives
    pub async fn run(mut self) -> DaemonResult<()> {
        let sweep_rx = self
            .sweep_rx
            .take()
            .ok_or_else(|| DaemonError::Scheduler("daemon already started".to_string()))?;

        let scheduler = self.scheduler.clone();
        let handle = tokio::spawn(scheduler.start(sweep_rx));

        tracing::info!(
            storage = storage_kind(&self.config.storage),
            "approvald running"
        );

        shutdown_signal().await;
        tracing::info!("approvald shutting down");

        self.scheduler.stop().await;
        handle
            .await
            .map_err(|e| DaemonError::Scheduler(e.to_string()))?;

        Ok(())
    }
}

fn storage_kind(config: &StorageConfig) -> &'static str {
    match config {
        StorageConfig::Memory => "memory",
        StorageConfig::Postgres { .. } => "postgres",
    }
}

async fn build_storage(config: &StorageConfig) -> DaemonResult<Arc<dyn ApprovalStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; approvals are lost on restart");
            Ok(Arc::new(InMemoryApprovalStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = approval_storage::postgres::PostgresApprovalStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections = *max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "postgres storage requires approvald built with the `postgres` feature".to_string(),
        )),
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
