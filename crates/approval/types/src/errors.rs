//! Validation errors for workflow definitions

use crate::{ConditionOperator, StepId};

/// Reasons a definition or condition is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("condition on '{field}': {operator} requires {expected}, found {found}")]
    OperandType {
        field: String,
        operator: ConditionOperator,
        expected: &'static str,
        found: &'static str,
    },

    #[error("condition on '{0}': 'in' requires at least one value")]
    EmptyInList(String),

    #[error("last condition (on '{0}') carries a logical operator with nothing to join")]
    DanglingLogicalOperator(String),

    #[error("workflow has no steps")]
    NoSteps,

    #[error("step order invalid: {0}")]
    StepOrder(String),

    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),

    #[error("step {step} has no {what}")]
    MissingApprover { step: StepId, what: &'static str },

    #[error("step {0} has a negative amount threshold")]
    NegativeThreshold(StepId),

    #[error("escalation rule references unknown step: {0}")]
    UnknownEscalationStep(StepId),

    #[error("more than one escalation rule for step: {0}")]
    DuplicateEscalationRule(StepId),

    #[error("escalation hours must be positive for step: {0}")]
    InvalidEscalationHours(StepId),

    #[error("escalation rule for step {0} targets specific_user without escalateToUserId")]
    MissingEscalationUser(StepId),
}
