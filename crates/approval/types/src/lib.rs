//! Domain types for multi-step approval workflows
//!
//! Finance entities (invoices, journal entries, purchase orders, ...) are
//! routed through tenant-configured approval chains before they post.
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: a versioned, immutable chain of ordered steps,
//!   scoped by tenant, company, entity type and optional subtype.
//! - **StepDefinition**: who approves (user, role, department or amount
//!   threshold), when the step applies, and when it escalates.
//! - **ApprovalRequest**: one workflow run for one entity, carrying the
//!   attribute snapshot the conditions were evaluated against.
//! - **StepAssignment**: the task handed to one approver. Escalation closes
//!   an assignment and appends a new one; history is never rewritten.
//! - **ApprovalEvent**: append-only audit log of every transition.
//!
//! Conditions and approver rules carry typed operands. Amounts are
//! `rust_decimal::Decimal` throughout.

#![deny(unsafe_code)]

mod assignment;
mod condition;
mod definition;
mod entity;
mod errors;
mod escalation;
mod event;
mod ids;
mod request;
mod value;

pub use assignment::*;
pub use condition::*;
pub use definition::*;
pub use entity::*;
pub use errors::*;
pub use escalation::*;
pub use event::*;
pub use ids::*;
pub use request::*;
pub use value::*;

pub use rust_decimal::Decimal;
