//! Escalation monitor: escalates assignments nobody acted on in time
//!
//! A sweep runs in two phases. It first pages through pending assignments
//! and picks the overdue ones, then escalates each through the normal
//! action path as the system actor. Escalated assignments leave `pending`,
//! so running the same sweep twice escalates nothing new.

use crate::engine::ApprovalEngine;
use crate::error::{ApprovalError, ApprovalResult};
use crate::state_machine::StepAction;
use approval_storage::QueryWindow;
use approval_types::{
    AssignmentId, RequestId, StepAssignment, TenantId, WorkflowDefinition, WorkflowId,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Default page size when reading pending assignments
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// A pending assignment past its deadline
#[derive(Clone, Debug, PartialEq)]
pub struct OverdueAssignment {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub assignment_id: AssignmentId,
    pub hours: u32,
    pub due_at: DateTime<Utc>,
}

/// Periodic escalation of overdue assignments
pub struct EscalationMonitor {
    engine: Arc<ApprovalEngine>,
    batch_size: usize,
}

impl EscalationMonitor {
    pub fn new(engine: Arc<ApprovalEngine>) -> Self {
        Self {
            engine,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pending assignments whose `assigned_at + hours` lies before `now`.
    ///
    /// Only steps with an escalation rule qualify. The step's own hours win
    /// over the rule's.
    pub async fn find_overdue(&self, now: DateTime<Utc>) -> ApprovalResult<Vec<OverdueAssignment>> {
        let storage = &self.engine.storage;
        let mut definitions: HashMap<(WorkflowId, u32), WorkflowDefinition> = HashMap::new();
        let mut overdue = Vec::new();
        let mut offset = 0;

        loop {
            let page = storage
                .pending_assignments(QueryWindow {
                    limit: self.batch_size,
                    offset,
                })
                .await?;
            let fetched = page.len();

            for entry in page {
                let request = match storage
                    .get_request(&entry.tenant_id, &entry.assignment.request_id)
                    .await
                {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(
                            request_id = %entry.assignment.request_id,
                            assignment_id = %entry.assignment.id,
                            error = %e,
                            "Skipping assignment: request unreadable"
                        );
                        continue;
                    }
                };
                if !request.is_pending() {
                    continue;
                }

                let key = (request.workflow_id.clone(), request.workflow_version);
                if !definitions.contains_key(&key) {
                    match self
                        .engine
                        .definition_version(&request.workflow_id, request.workflow_version)
                        .await
                    {
                        Ok(definition) => {
                            definitions.insert(key.clone(), definition);
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request.id,
                                assignment_id = %entry.assignment.id,
                                workflow_id = %request.workflow_id,
                                version = request.workflow_version,
                                error = %e,
                                "Skipping assignment: definition unavailable"
                            );
                            continue;
                        }
                    }
                }
                let Some(definition) = definitions.get(&key) else {
                    continue;
                };

                if let Some(found) =
                    check_assignment(&entry.tenant_id, definition, &entry.assignment, now)
                {
                    overdue.push(found);
                }
            }

            if fetched < self.batch_size {
                break;
            }
            offset += fetched;
        }

        Ok(overdue)
    }

    /// Escalate every overdue assignment; returns the escalated ids.
    ///
    /// Losing a race to a human action is expected and skipped quietly.
    /// Any other failure is logged and the sweep moves on.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ApprovalResult<Vec<AssignmentId>> {
        let overdue = self.find_overdue(now).await?;
        let system = self.engine.config().system_actor.clone();
        let mut escalated = Vec::new();

        for item in overdue {
            let action = StepAction::escalate(
                item.tenant_id.clone(),
                item.request_id.clone(),
                item.assignment_id.clone(),
                system.clone(),
            )
            .with_reason(format!("overdue: no action within {} hours", item.hours));

            match self.engine.act(action, now).await {
                Ok(_) => escalated.push(item.assignment_id),
                Err(ApprovalError::Conflict(reason)) => {
                    tracing::debug!(
                        assignment_id = %item.assignment_id,
                        reason = %reason,
                        "Overdue assignment already settled"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %item.request_id,
                        assignment_id = %item.assignment_id,
                        error = %e,
                        "Escalation failed"
                    );
                }
            }
        }

        if !escalated.is_empty() {
            tracing::info!(escalated = escalated.len(), "Escalation sweep complete");
        }
        Ok(escalated)
    }
}

/// Deadline check for one pending assignment
fn check_assignment(
    tenant_id: &TenantId,
    definition: &WorkflowDefinition,
    assignment: &StepAssignment,
    now: DateTime<Utc>,
) -> Option<OverdueAssignment> {
    if !assignment.is_pending() {
        return None;
    }
    let hours = definition.escalation_hours_for(&assignment.step_id)?;
    let due_at = assignment.assigned_at + Duration::hours(i64::from(hours));
    (due_at < now).then(|| OverdueAssignment {
        tenant_id: tenant_id.clone(),
        request_id: assignment.request_id.clone(),
        assignment_id: assignment.id.clone(),
        hours,
        due_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{
        ApproverRule, CompanyId, EntityType, EscalationRule, EscalationTarget, StepDefinition,
        StepId, UserId,
    };

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            TenantId::new("t1"),
            CompanyId::new("c1"),
            "bills",
            EntityType::Bill,
        )
        .with_step(StepDefinition::new("s1", "Manager", 1, ApproverRule::role("manager")))
        .with_step(
            StepDefinition::new("s2", "Finance", 2, ApproverRule::role("finance"))
                .with_escalation_hours(4),
        )
        .with_step(StepDefinition::new("s3", "CFO", 3, ApproverRule::user("cfo")))
        .with_escalation_rule(EscalationRule::new("s1", 24, EscalationTarget::Manager))
        .with_escalation_rule(EscalationRule::new("s2", 48, EscalationTarget::Manager))
    }

    fn t1() -> TenantId {
        TenantId::new("t1")
    }

    fn assignment(step: &str, hours_ago: i64, now: DateTime<Utc>) -> StepAssignment {
        StepAssignment::new(
            RequestId::new("r1"),
            StepId::new(step),
            step,
            1,
            UserId::new("mia"),
            now - Duration::hours(hours_ago),
        )
    }

    #[test]
    fn deadline_is_strict() {
        let now = Utc::now();
        let def = definition();
        assert!(check_assignment(&t1(), &def, &assignment("s1", 24, now), now).is_none());
        let hit = check_assignment(&t1(), &def, &assignment("s1", 25, now), now).unwrap();
        assert_eq!(hit.hours, 24);
    }

    #[test]
    fn step_hours_override_rule_hours() {
        let now = Utc::now();
        let hit = check_assignment(&t1(), &definition(), &assignment("s2", 5, now), now).unwrap();
        assert_eq!(hit.hours, 4);
    }

    #[test]
    fn steps_without_rule_never_escalate() {
        let now = Utc::now();
        assert!(check_assignment(&t1(), &definition(), &assignment("s3", 10_000, now), now).is_none());
    }
}
