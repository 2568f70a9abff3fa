//! Escalation rules: who takes over an overdue step
//!
//! Escalation is opt-in per step. A step without a rule cannot be escalated,
//! neither by a caller nor by the escalation monitor.

use crate::{StepId, UserId};
use serde::{Deserialize, Serialize};

/// Escalation rule attached to one step of a workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    /// The step this rule applies to
    pub step_id: StepId,
    /// Hours a pending assignment may wait before the monitor escalates it.
    /// Used when the step itself declares no `escalationHours`.
    pub escalation_hours: u32,
    /// First escalation target
    pub escalate_to: EscalationTarget,
    /// Required when `escalate_to` is `specific_user`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to_user_id: Option<UserId>,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannel>,
}

impl EscalationRule {
    pub fn new(step_id: impl Into<StepId>, escalation_hours: u32, escalate_to: EscalationTarget) -> Self {
        Self {
            step_id: step_id.into(),
            escalation_hours,
            escalate_to,
            escalate_to_user_id: None,
            notification_channels: vec![NotificationChannel::Email],
        }
    }

    pub fn to_user(step_id: impl Into<StepId>, escalation_hours: u32, user: UserId) -> Self {
        Self {
            escalate_to_user_id: Some(user),
            ..Self::new(step_id, escalation_hours, EscalationTarget::SpecificUser)
        }
    }

    pub fn with_channels(mut self, channels: Vec<NotificationChannel>) -> Self {
        self.notification_channels = channels;
        self
    }
}

/// Where an escalation goes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    Manager,
    Director,
    Ceo,
    SpecificUser,
}

impl EscalationTarget {
    /// The next tier up the ladder, if any. `specific_user` has no successor.
    pub fn next(&self) -> Option<EscalationTarget> {
        match self {
            EscalationTarget::Manager => Some(EscalationTarget::Director),
            EscalationTarget::Director => Some(EscalationTarget::Ceo),
            EscalationTarget::Ceo | EscalationTarget::SpecificUser => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTarget::Manager => "manager",
            EscalationTarget::Director => "director",
            EscalationTarget::Ceo => "ceo",
            EscalationTarget::SpecificUser => "specific_user",
        }
    }
}

impl std::fmt::Display for EscalationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel hint passed to the notification collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Slack,
    InApp,
}
