//! Workflow definitions: the routing rules administrators configure
//!
//! A definition applies to one `(entity type, optional subtype, company)`
//! scope and lists the ordered steps an approval request walks through.
//! Definitions are immutable once stored: an administrative update stores a
//! new version, and in-flight requests keep the version they started with.

use crate::condition::validate_conditions;
use crate::{
    CompanyId, Condition, EntityType, EscalationRule, EscalationTarget, StepId, TenantId, UserId,
    ValidationError, WorkflowId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Workflow priority, used to break ties between matching definitions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

// ── Workflow Definition ──────────────────────────────────────────────

/// A named, versioned routing rule for one entity scope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "WorkflowId::generate")]
    pub id: WorkflowId,
    /// Bumped on every administrative update
    #[serde(default = "initial_version")]
    pub version: u32,
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub entity_type: EntityType,
    /// `None` matches every subtype of the entity type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_sub_type: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: Priority,
    pub steps: Vec<StepDefinition>,
    /// Workflow-level conditions; the workflow only applies when they hold
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Resolve matching requests as approved without running any step
    #[serde(default)]
    pub auto_approval: bool,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn new(
        tenant_id: TenantId,
        company_id: CompanyId,
        name: impl Into<String>,
        entity_type: EntityType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::generate(),
            version: 1,
            tenant_id,
            company_id,
            name: name.into(),
            description: String::new(),
            entity_type,
            entity_sub_type: None,
            is_active: true,
            priority: Priority::Medium,
            steps: Vec::new(),
            conditions: Vec::new(),
            auto_approval: false,
            escalation_rules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.entity_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_auto_approval(mut self, auto_approval: bool) -> Self {
        self.auto_approval = auto_approval;
        self
    }

    pub fn with_escalation_rule(mut self, rule: EscalationRule) -> Self {
        self.escalation_rules.push(rule);
        self
    }

    /// Steps sorted by their declared order
    pub fn steps_in_order(&self) -> Vec<&StepDefinition> {
        let mut steps: Vec<_> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn escalation_rule_for(&self, step_id: &StepId) -> Option<&EscalationRule> {
        self.escalation_rules.iter().find(|r| &r.step_id == step_id)
    }

    /// Hours after which a pending assignment on `step_id` is overdue.
    /// `None` when the step cannot be escalated at all.
    pub fn escalation_hours_for(&self, step_id: &StepId) -> Option<u32> {
        let rule = self.escalation_rule_for(step_id)?;
        let step_hours = self.step(step_id).and_then(|s| s.escalation_hours);
        Some(step_hours.unwrap_or(rule.escalation_hours))
    }

    /// The successor of this definition for an administrative update
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next
    }

    /// Validate the definition for structural correctness.
    ///
    /// Malformed definitions are rejected here and never repaired.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("workflow name"));
        }
        if self.tenant_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyField("tenant id"));
        }
        if self.company_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyField("company id"));
        }
        if matches!(&self.entity_sub_type, Some(s) if s.trim().is_empty()) {
            return Err(ValidationError::EmptyField("entity subtype"));
        }
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }

        // Step orders: unique and contiguous from 1
        let mut orders: Vec<u32> = self.steps.iter().map(|s| s.order).collect();
        orders.sort_unstable();
        for (expected, actual) in (1u32..).zip(orders.iter()) {
            if expected != *actual {
                return Err(ValidationError::StepOrder(format!(
                    "expected order {} but found {} (orders: {:?})",
                    expected, actual, orders
                )));
            }
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(&step.id) {
                return Err(ValidationError::DuplicateStepId(step.id.clone()));
            }
            step.validate()?;
        }

        validate_conditions(&self.conditions)?;

        let mut ruled_steps = HashSet::new();
        for rule in &self.escalation_rules {
            if self.step(&rule.step_id).is_none() {
                return Err(ValidationError::UnknownEscalationStep(rule.step_id.clone()));
            }
            if !ruled_steps.insert(&rule.step_id) {
                return Err(ValidationError::DuplicateEscalationRule(rule.step_id.clone()));
            }
            if rule.escalation_hours == 0 {
                return Err(ValidationError::InvalidEscalationHours(rule.step_id.clone()));
            }
            if rule.escalate_to == EscalationTarget::SpecificUser
                && !rule
                    .escalate_to_user_id
                    .as_ref()
                    .is_some_and(|u| !u.as_str().trim().is_empty())
            {
                return Err(ValidationError::MissingEscalationUser(rule.step_id.clone()));
            }
        }

        Ok(())
    }

    /// Whether this definition's subtype matches exactly (as opposed to
    /// matching as a wildcard)
    pub fn is_exact_sub_type(&self, sub_type: Option<&str>) -> bool {
        matches!((self.entity_sub_type.as_deref(), sub_type), (Some(a), Some(b)) if a == b)
    }

    /// Scope check used by workflow selection (ignores conditions)
    pub fn covers(
        &self,
        tenant_id: &TenantId,
        company_id: &CompanyId,
        entity_type: EntityType,
        sub_type: Option<&str>,
    ) -> bool {
        self.is_active
            && &self.tenant_id == tenant_id
            && &self.company_id == company_id
            && self.entity_type == entity_type
            && match self.entity_sub_type.as_deref() {
                None => true,
                Some(own) => sub_type == Some(own),
            }
    }
}

// ── Step Definition ──────────────────────────────────────────────────

/// One stage within a workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: StepId,
    pub name: String,
    /// 1-based position within the workflow
    pub order: u32,
    #[serde(flatten)]
    pub approver: ApproverRule,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_hours: Option<u32>,
    /// Resolve the step without a human whenever it applies
    #[serde(default)]
    pub auto_approve: bool,
    /// Step-level gating; a step whose conditions fail is skipped
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<StepId>,
        name: impl Into<String>,
        order: u32,
        approver: ApproverRule,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order,
            approver,
            is_required: true,
            escalation_hours: None,
            auto_approve: false,
            conditions: Vec::new(),
        }
    }

    pub fn with_escalation_hours(mut self, hours: u32) -> Self {
        self.escalation_hours = Some(hours);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyField("step id"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("step name"));
        }
        if self.escalation_hours == Some(0) {
            return Err(ValidationError::InvalidEscalationHours(self.id.clone()));
        }
        let missing = |what: &'static str| ValidationError::MissingApprover {
            step: self.id.clone(),
            what,
        };
        match &self.approver {
            ApproverRule::User { approver_id } if approver_id.as_str().trim().is_empty() => {
                return Err(missing("approverId"));
            }
            ApproverRule::Role { role } if role.trim().is_empty() => {
                return Err(missing("role"));
            }
            ApproverRule::Department { department } if department.trim().is_empty() => {
                return Err(missing("department"));
            }
            ApproverRule::AmountBased { amount_threshold } if amount_threshold.is_sign_negative() => {
                return Err(ValidationError::NegativeThreshold(self.id.clone()));
            }
            _ => {}
        }
        validate_conditions(&self.conditions)
    }
}

/// How a step finds its approver. Exactly one identifier per kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "approverType", rename_all = "snake_case")]
pub enum ApproverRule {
    User {
        #[serde(rename = "approverId")]
        approver_id: UserId,
    },
    Role {
        role: String,
    },
    Department {
        department: String,
    },
    /// Below the threshold the step approves itself; at or above it a
    /// configured fallback role decides
    AmountBased {
        #[serde(rename = "amountThreshold")]
        amount_threshold: Decimal,
    },
}

impl ApproverRule {
    pub fn user(id: impl Into<UserId>) -> Self {
        ApproverRule::User {
            approver_id: id.into(),
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        ApproverRule::Role { role: role.into() }
    }

    pub fn department(department: impl Into<String>) -> Self {
        ApproverRule::Department {
            department: department.into(),
        }
    }

    pub fn amount_based(threshold: impl Into<Decimal>) -> Self {
        ApproverRule::AmountBased {
            amount_threshold: threshold.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApproverRule::User { .. } => "user",
            ApproverRule::Role { .. } => "role",
            ApproverRule::Department { .. } => "department",
            ApproverRule::AmountBased { .. } => "amount_based",
        }
    }
}
