//! Approval requests: one workflow run for one entity
//!
//! The state machine is the only writer of a request's status and counters.
//! Requests are never deleted; terminal requests are the audit trail.

use crate::{
    Attributes, CompanyId, EntityId, EntityType, RequestId, StepId, TenantId, UserId, WorkflowId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    /// Escalation ran out of targets; waits for manual reassignment
    Escalated,
    Cancelled,
}

impl RequestStatus {
    /// Approved, rejected and cancelled never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Escalated => "escalated",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Escalated,
            RequestStatus::Cancelled,
        ]
        .into_iter()
        .find(|s| s.as_str() == code)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight or completed approval instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_sub_type: Option<String>,
    pub workflow_id: WorkflowId,
    /// The definition version this request runs on
    pub workflow_version: u32,
    pub status: RequestStatus,
    /// 1-based index into `plan`; 0 only when `plan` is empty
    pub current_step: u32,
    pub total_steps: u32,
    pub completed_steps: u32,
    /// Applicable steps in execution order, fixed at creation
    pub plan: Vec<StepId>,
    /// Steps whose conditions did not hold at creation
    #[serde(default)]
    pub skipped_steps: Vec<StepId>,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Entity attribute snapshot used for condition evaluation
    #[serde(default)]
    pub metadata: Attributes,
    /// Optimistic concurrency counter, bumped on every committed change
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending or escalated: the entity still awaits a decision
    pub fn is_open(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::Escalated)
    }

    /// The step the request is currently waiting on
    pub fn current_step_id(&self) -> Option<&StepId> {
        if self.current_step == 0 {
            return None;
        }
        self.plan.get(self.current_step as usize - 1)
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step == self.total_steps
    }

    /// `completed_steps <= current_step <= total_steps`
    pub fn is_balanced(&self) -> bool {
        self.completed_steps <= self.current_step && self.current_step <= self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Escalated.is_terminal());
    }

    #[test]
    fn status_codes_round_trip() {
        for code in ["pending", "approved", "rejected", "escalated", "cancelled"] {
            assert_eq!(RequestStatus::parse(code).unwrap().as_str(), code);
        }
        assert!(RequestStatus::parse("done").is_none());
    }
}
