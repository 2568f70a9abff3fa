//! Storage abstractions for the approval engine.
//!
//! This crate defines the persistence contract for:
//! - versioned workflow definitions (every version kept)
//! - approval requests with optimistic versioning
//! - append-only step assignment history
//! - the per-request audit event log
//!
//! Design stance:
//! - Every state change of a request is one atomic `commit`: assignment
//!   compare-and-set, request version check, new assignments and events.
//! - At most one open request per `(tenant, entity type, entity id)` is
//!   enforced by the store, not by callers.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryApprovalStorage;
pub use model::{RequestCreation, RequestTransition, TenantAssignment};
pub use traits::{ApprovalStorage, ApprovalStore, QueryWindow, WorkflowStore};
