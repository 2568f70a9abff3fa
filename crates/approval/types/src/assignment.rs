//! Step assignments: the task given to one approver for one step
//!
//! Assignments form an append-only history. Escalation never rewrites the
//! escalated row beyond closing it; the new approver gets a fresh row with
//! the next `sequence` for the same `(request, step)`.

use crate::{AssignmentId, EscalationTarget, RequestId, StepId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-assignment status. Leaves `pending` exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Approved => "approved",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Escalated => "escalated",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        [
            AssignmentStatus::Pending,
            AssignmentStatus::Approved,
            AssignmentStatus::Rejected,
            AssignmentStatus::Escalated,
        ]
        .into_iter()
        .find(|s| s.as_str() == code)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action an approver (or the escalation monitor) takes on an assignment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Escalate,
}

impl ApprovalAction {
    /// The assignment status this action settles into
    pub fn settles_as(&self) -> AssignmentStatus {
        match self {
            ApprovalAction::Approve => AssignmentStatus::Approved,
            ApprovalAction::Reject => AssignmentStatus::Rejected,
            ApprovalAction::Escalate => AssignmentStatus::Escalated,
        }
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
            ApprovalAction::Escalate => "escalate",
        })
    }
}

/// A concrete approval task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAssignment {
    pub id: AssignmentId,
    pub request_id: RequestId,
    pub step_id: StepId,
    pub step_name: String,
    pub step_order: u32,
    /// 0 for the first assignment of a step, +1 per escalation
    pub sequence: u32,
    pub user_id: UserId,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// Ladder tier that produced this assignment, if it came from escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<EscalationTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acted_by: Option<UserId>,
}

impl StepAssignment {
    pub fn new(
        request_id: RequestId,
        step_id: StepId,
        step_name: impl Into<String>,
        step_order: u32,
        user_id: UserId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::generate(),
            request_id,
            step_id,
            step_name: step_name.into(),
            step_order,
            sequence: 0,
            user_id,
            status: AssignmentStatus::Pending,
            assigned_at,
            completed_at: None,
            comments: None,
            escalated_to: None,
            escalation_reason: None,
            escalation_level: None,
            acted_by: None,
        }
    }

    /// The replacement row created when this assignment is escalated
    pub fn escalated_successor(
        &self,
        user_id: UserId,
        level: EscalationTarget,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence: self.sequence + 1,
            escalation_level: Some(level),
            ..Self::new(
                self.request_id.clone(),
                self.step_id.clone(),
                self.step_name.clone(),
                self.step_order,
                user_id,
                assigned_at,
            )
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AssignmentStatus::Pending
    }

    /// Hours this assignment has been waiting at `now`
    pub fn hours_waiting(&self, now: DateTime<Utc>) -> i64 {
        (now - self.assigned_at).num_hours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn successor_keeps_step_and_bumps_sequence() {
        let now = Utc::now();
        let first = StepAssignment::new(
            RequestId::new("r1"),
            StepId::new("s1"),
            "Manager",
            1,
            UserId::new("alice"),
            now,
        );
        let next = first.escalated_successor(UserId::new("bob"), EscalationTarget::Manager, now);
        assert_eq!(next.step_id, first.step_id);
        assert_eq!(next.sequence, 1);
        assert_ne!(next.id, first.id);
        assert!(next.is_pending());
        assert_eq!(next.escalation_level, Some(EscalationTarget::Manager));
    }

    #[test]
    fn hours_waiting() {
        let now = Utc::now();
        let a = StepAssignment::new(
            RequestId::new("r1"),
            StepId::new("s1"),
            "Manager",
            1,
            UserId::new("alice"),
            now - Duration::hours(25),
        );
        assert_eq!(a.hours_waiting(now), 25);
    }

    #[test]
    fn action_settlement() {
        assert_eq!(ApprovalAction::Approve.settles_as(), AssignmentStatus::Approved);
        assert_eq!(ApprovalAction::Reject.settles_as(), AssignmentStatus::Rejected);
        assert_eq!(ApprovalAction::Escalate.settles_as(), AssignmentStatus::Escalated);
    }
}
