//! Approval workflow engine
//!
//! Routes finance entities through tenant-configured approval chains:
//! picks the workflow, resolves who approves each step, walks the steps,
//! and escalates assignments that sit too long.
//!
//! # Key Principle
//!
//! **Every transition is one atomic storage commit.** The engine computes
//! the next request state, the settled assignment, any new assignments and
//! the audit events in memory, then hands them to the store as a single
//! compare-and-set. Notifications and entity callbacks run only after the
//! commit succeeds.
//!
//! # Architecture
//!
//! The [`ApprovalEngine`] composes specialized components:
//!
//! - [`DefinitionCache`]: latest workflow definitions, with explicit load and invalidate
//! - [`select_workflow`]: picks the governing definition for an entity
//! - [`ConditionEvaluator`]: pure evaluation of gating conditions
//! - [`ApproverResolver`]: maps approver rules to people through the [`Directory`]
//! - [`EscalationMonitor`]: periodic sweep over overdue assignments
//!
//! # Example
//!
//! ```rust
//! use approval_engine::{ApprovalEngine, EngineConfig, StaticDirectory, Submission};
//! use approval_storage::InMemoryApprovalStorage;
//! use approval_types::*;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let directory = StaticDirectory::new().with_role("acme", "manager", "mia");
//! let engine = ApprovalEngine::new(
//!     Arc::new(InMemoryApprovalStorage::new()),
//!     Arc::new(directory),
//!     EngineConfig::default(),
//! );
//!
//! let definition = WorkflowDefinition::new(
//!     TenantId::new("t1"),
//!     CompanyId::new("acme"),
//!     "Invoices",
//!     EntityType::Invoice,
//! )
//! .with_step(StepDefinition::new("manager", "Manager", 1, ApproverRule::role("manager")));
//! engine.create_workflow(definition).await.unwrap();
//!
//! let request = engine
//!     .submit_for_approval(
//!         Submission::new(
//!             TenantId::new("t1"),
//!             CompanyId::new("acme"),
//!             EntityType::Invoice,
//!             "inv-1",
//!             UserId::new("clerk"),
//!         )
//!         .with_attribute("amount", 500i64),
//!     )
//!     .await
//!     .unwrap();
//! assert!(request.is_pending());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]

pub mod approver_resolver;
pub mod collaborators;
pub mod condition_evaluator;
pub mod config;
pub mod definition_cache;
pub mod engine;
pub mod error;
pub mod escalation_monitor;
pub mod state_machine;
pub mod workflow_selector;

// Re-export main types
pub use approver_resolver::{ApproverResolver, Resolution};
pub use collaborators::{
    CollaboratorError, CollaboratorResult, Directory, EntityCallback, NoopCallback, NoopNotifier,
    Notification, NotificationKind, Notifier, RecordingCallback, RecordingNotifier,
    StaticDirectory,
};
pub use condition_evaluator::ConditionEvaluator;
pub use config::EngineConfig;
pub use definition_cache::DefinitionCache;
pub use engine::ApprovalEngine;
pub use error::{ApprovalError, ApprovalResult, ErrorKind};
pub use escalation_monitor::{EscalationMonitor, OverdueAssignment, DEFAULT_BATCH_SIZE};
pub use state_machine::{StepAction, Submission};
pub use workflow_selector::select_workflow;
