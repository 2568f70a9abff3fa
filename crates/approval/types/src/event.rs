//! Append-only audit events for approval requests
//!
//! Every committed transition writes at least one event in the same atomic
//! unit as the state change, so the event log and the request never disagree.

use crate::{AssignmentId, EventId, RequestId, StepId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequestCreated,
    StepAssigned,
    StepSkipped,
    StepAutoApproved,
    StepApproved,
    StepRejected,
    StepEscalated,
    RequestApproved,
    RequestRejected,
    /// Escalation ladder exhausted; request parked in `escalated`
    EscalationExhausted,
    RequestReassigned,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestCreated => "request_created",
            EventKind::StepAssigned => "step_assigned",
            EventKind::StepSkipped => "step_skipped",
            EventKind::StepAutoApproved => "step_auto_approved",
            EventKind::StepApproved => "step_approved",
            EventKind::StepRejected => "step_rejected",
            EventKind::StepEscalated => "step_escalated",
            EventKind::RequestApproved => "request_approved",
            EventKind::RequestRejected => "request_rejected",
            EventKind::EscalationExhausted => "escalation_exhausted",
            EventKind::RequestReassigned => "request_reassigned",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        [
            EventKind::RequestCreated,
            EventKind::StepAssigned,
            EventKind::StepSkipped,
            EventKind::StepAutoApproved,
            EventKind::StepApproved,
            EventKind::StepRejected,
            EventKind::StepEscalated,
            EventKind::RequestApproved,
            EventKind::RequestRejected,
            EventKind::EscalationExhausted,
            EventKind::RequestReassigned,
        ]
        .into_iter()
        .find(|k| k.as_str() == code)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit log entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub id: EventId,
    pub request_id: RequestId,
    pub tenant_id: TenantId,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<AssignmentId>,
    pub actor: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn new(
        request_id: RequestId,
        tenant_id: TenantId,
        kind: EventKind,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            request_id,
            tenant_id,
            kind,
            step_id: None,
            assignment_id: None,
            actor,
            message: None,
            at,
        }
    }

    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_assignment(mut self, assignment_id: AssignmentId) -> Self {
        self.assignment_id = Some(assignment_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for kind in [
            EventKind::RequestCreated,
            EventKind::StepAutoApproved,
            EventKind::EscalationExhausted,
            EventKind::RequestReassigned,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        let json = serde_json::to_value(EventKind::StepSkipped).unwrap();
        assert_eq!(json, "step_skipped");
    }
}
