//! Approver resolver: turns a step's approver rule into a person
//!
//! The resolver only reads. It never creates assignments or touches
//! storage; the state machine acts on what it returns.

use crate::collaborators::Directory;
use crate::config::EngineConfig;
use crate::error::{ApprovalError, ApprovalResult};
use approval_types::{
    ApproverRule, Attributes, CompanyId, EscalationRule, EscalationTarget, StepDefinition, UserId,
};
use std::sync::Arc;

/// Outcome of resolving one step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A human decides
    Approver(UserId),
    /// The step resolves itself
    AutoApprove,
    /// Nobody can be found; carries the reason
    Unresolvable(String),
}

/// Resolves step approvers and escalation targets
#[derive(Clone)]
pub struct ApproverResolver {
    directory: Arc<dyn Directory>,
    config: EngineConfig,
}

impl ApproverResolver {
    pub fn new(directory: Arc<dyn Directory>, config: EngineConfig) -> Self {
        Self { directory, config }
    }

    /// Resolve an applicable step.
    ///
    /// `auto_approve` wins over the approver rule. An `amount_based` step
    /// approves itself strictly below the threshold; a missing or
    /// non-numeric amount goes to the fallback role.
    pub async fn resolve(
        &self,
        step: &StepDefinition,
        company_id: &CompanyId,
        attributes: &Attributes,
    ) -> ApprovalResult<Resolution> {
        if step.auto_approve {
            return Ok(Resolution::AutoApprove);
        }

        let resolution = match &step.approver {
            ApproverRule::User { approver_id } => Resolution::Approver(approver_id.clone()),
            ApproverRule::Role { role } => self.by_role(company_id, role).await?,
            ApproverRule::Department { department } => {
                let found = self
                    .directory
                    .find_by_department(company_id, department)
                    .await
                    .map_err(|e| ApprovalError::Directory(e.to_string()))?;
                match found {
                    Some(user) => Resolution::Approver(user),
                    None => Resolution::Unresolvable(format!(
                        "no approver for department '{}' in company {}",
                        department, company_id
                    )),
                }
            }
            ApproverRule::AmountBased { amount_threshold } => {
                let amount = attributes
                    .get(&self.config.amount_field)
                    .and_then(|v| v.as_number());
                match amount {
                    Some(amount) if amount < *amount_threshold => Resolution::AutoApprove,
                    _ => {
                        let role = self.config.amount_fallback_role.clone();
                        self.by_role(company_id, &role).await?
                    }
                }
            }
        };

        tracing::debug!(
            step_id = %step.id,
            approver_type = step.approver.kind(),
            resolution = ?resolution,
            "Step approver resolved"
        );
        Ok(resolution)
    }

    /// Resolve who receives an escalation at `tier`.
    ///
    /// `specific_user` yields the rule's configured user; ladder tiers ask
    /// the directory relative to the current assignee. `None` means the
    /// directory has nobody for that tier.
    pub async fn escalation_target(
        &self,
        rule: &EscalationRule,
        tier: EscalationTarget,
        company_id: &CompanyId,
        current_assignee: &UserId,
    ) -> ApprovalResult<Option<UserId>> {
        if tier == EscalationTarget::SpecificUser {
            return Ok(rule.escalate_to_user_id.clone());
        }
        self.directory
            .escalation_contact(company_id, tier, current_assignee)
            .await
            .map_err(|e| ApprovalError::Directory(e.to_string()))
    }

    async fn by_role(&self, company_id: &CompanyId, role: &str) -> ApprovalResult<Resolution> {
        let found = self
            .directory
            .find_by_role(company_id, role)
            .await
            .map_err(|e| ApprovalError::Directory(e.to_string()))?;
        Ok(match found {
            Some(user) => Resolution::Approver(user),
            None => Resolution::Unresolvable(format!(
                "no approver for role '{}' in company {}",
                role, company_id
            )),
        })
    }
}
