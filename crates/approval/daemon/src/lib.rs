//! approvald - approval workflow daemon
//!
//! Hosts an [`approval_engine::ApprovalEngine`] over the configured storage,
//! installs workflow definitions from a JSON file at startup and runs the
//! escalation sweep on a fixed interval.

#![deny(unsafe_code)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod hooks;
pub mod scheduler;
pub mod workflows;

pub use config::{DaemonConfig, LoggingConfig, SchedulerConfig, StorageConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use hooks::{LogCallback, LogNotifier};
pub use scheduler::EscalationScheduler;
pub use workflows::{install, parse_workflows, read_workflow_file, InstallSummary};
