//! Request state machine
//!
//! ```text
//! pending ──approve (last step)──▶ approved
//! pending ──reject──────────────▶ rejected
//! pending ──escalate────────────▶ pending   (same step, next assignee)
//! pending ──escalate (exhausted)▶ escalated ──reassign──▶ pending
//! ```
//!
//! Every transition is computed in memory and written with a single
//! storage commit. Nothing is written when advancement fails part way.

use crate::approver_resolver::Resolution;
use crate::collaborators::{Notification, NotificationKind};
use crate::engine::ApprovalEngine;
use crate::error::{ApprovalError, ApprovalResult};
use approval_storage::{RequestCreation, RequestTransition};
use approval_types::{
    ApprovalAction, ApprovalEvent, ApprovalRequest, AssignmentId, AttributeValue, Attributes,
    CompanyId, EntityId, EntityType, EventKind, NotificationChannel, RequestId, RequestStatus,
    StepAssignment, StepDefinition, StepId, TenantId, UserId, WorkflowDefinition,
};
use chrono::{DateTime, Utc};

/// An entity handed to the engine for approval
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub entity_sub_type: Option<String>,
    pub requested_by: UserId,
    /// Attribute snapshot used for conditions and amount-based routing
    pub metadata: Attributes,
}

impl Submission {
    pub fn new(
        tenant_id: TenantId,
        company_id: CompanyId,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        requested_by: UserId,
    ) -> Self {
        Self {
            tenant_id,
            company_id,
            entity_type,
            entity_id: entity_id.into(),
            entity_sub_type: None,
            requested_by,
            metadata: Attributes::new(),
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.entity_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Attributes) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A decision on one assignment
#[derive(Clone, Debug, PartialEq)]
pub struct StepAction {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub assignment_id: AssignmentId,
    pub action: ApprovalAction,
    pub actor: UserId,
    pub comments: Option<String>,
    pub escalation_reason: Option<String>,
}

impl StepAction {
    fn new(
        action: ApprovalAction,
        tenant_id: TenantId,
        request_id: RequestId,
        assignment_id: AssignmentId,
        actor: UserId,
    ) -> Self {
        Self {
            tenant_id,
            request_id,
            assignment_id,
            action,
            actor,
            comments: None,
            escalation_reason: None,
        }
    }

    pub fn approve(
        tenant_id: TenantId,
        request_id: RequestId,
        assignment_id: AssignmentId,
        actor: UserId,
    ) -> Self {
        Self::new(ApprovalAction::Approve, tenant_id, request_id, assignment_id, actor)
    }

    pub fn reject(
        tenant_id: TenantId,
        request_id: RequestId,
        assignment_id: AssignmentId,
        actor: UserId,
    ) -> Self {
        Self::new(ApprovalAction::Reject, tenant_id, request_id, assignment_id, actor)
    }

    pub fn escalate(
        tenant_id: TenantId,
        request_id: RequestId,
        assignment_id: AssignmentId,
        actor: UserId,
    ) -> Self {
        Self::new(ApprovalAction::Escalate, tenant_id, request_id, assignment_id, actor)
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.escalation_reason = Some(reason.into());
        self
    }
}

/// Writes and side effects collected while computing a transition
#[derive(Default)]
struct Effects {
    assignments: Vec<StepAssignment>,
    events: Vec<ApprovalEvent>,
    notifications: Vec<Notification>,
}

impl Effects {
    fn event(
        &mut self,
        request: &ApprovalRequest,
        kind: EventKind,
        actor: &UserId,
        at: DateTime<Utc>,
    ) -> &mut ApprovalEvent {
        self.events.push(ApprovalEvent::new(
            request.id.clone(),
            request.tenant_id.clone(),
            kind,
            actor.clone(),
            at,
        ));
        let last = self.events.len() - 1;
        &mut self.events[last]
    }

    fn notify(
        &mut self,
        request: &ApprovalRequest,
        recipient: UserId,
        kind: NotificationKind,
        assignment_id: Option<AssignmentId>,
        channels: Vec<NotificationChannel>,
        message: String,
    ) {
        self.notifications.push(Notification {
            tenant_id: request.tenant_id.clone(),
            recipient,
            kind,
            request_id: request.id.clone(),
            assignment_id,
            channels,
            message,
        });
    }
}

fn channels_for(definition: &WorkflowDefinition, step_id: &StepId) -> Vec<NotificationChannel> {
    definition
        .escalation_rule_for(step_id)
        .map(|rule| rule.notification_channels.clone())
        .unwrap_or_default()
}

impl ApprovalEngine {
    // ── Submission ───────────────────────────────────────────────────

    /// Start an approval request for an entity.
    ///
    /// Fails with `Conflict` while another request for the same entity is
    /// open, `NoApplicableWorkflow` when no definition matches and
    /// `Unresolvable` when a required step has nobody to decide it.
    pub async fn submit_for_approval(
        &self,
        submission: Submission,
    ) -> ApprovalResult<ApprovalRequest> {
        let now = Utc::now();

        if let Some(open) = self
            .storage
            .find_open_request(
                &submission.tenant_id,
                submission.entity_type,
                &submission.entity_id,
            )
            .await?
        {
            return Err(ApprovalError::Conflict(format!(
                "{} {} already has open request {}",
                submission.entity_type, submission.entity_id, open.id
            )));
        }

        let definition = self
            .definitions
            .select(
                &submission.tenant_id,
                &submission.company_id,
                submission.entity_type,
                submission.entity_sub_type.as_deref(),
                &submission.metadata,
            )?
            .ok_or_else(|| {
                ApprovalError::NoApplicableWorkflow(format!(
                    "{} {}",
                    submission.entity_type, submission.entity_id
                ))
            })?;

        let mut plan = Vec::new();
        let mut skipped = Vec::new();
        for step in definition.steps_in_order() {
            if self.evaluator.evaluate(&step.conditions, &submission.metadata) {
                plan.push(step.id.clone());
            } else {
                skipped.push(step.id.clone());
            }
        }

        let total_steps = plan.len() as u32;
        let mut request = ApprovalRequest {
            id: RequestId::generate(),
            tenant_id: submission.tenant_id,
            company_id: submission.company_id,
            entity_type: submission.entity_type,
            entity_id: submission.entity_id,
            entity_sub_type: submission.entity_sub_type,
            workflow_id: definition.id.clone(),
            workflow_version: definition.version,
            status: RequestStatus::Pending,
            current_step: u32::from(total_steps > 0),
            total_steps,
            completed_steps: 0,
            plan,
            skipped_steps: skipped.clone(),
            requested_by: submission.requested_by,
            requested_at: now,
            approved_at: None,
            rejected_at: None,
            comments: None,
            metadata: submission.metadata,
            version: 1,
            updated_at: now,
        };

        let actor = request.requested_by.clone();
        let mut effects = Effects::default();
        effects
            .event(&request, EventKind::RequestCreated, &actor, now)
            .message = Some(format!(
            "workflow {} v{}",
            definition.name, definition.version
        ));
        for step_id in skipped {
            effects
                .event(&request, EventKind::StepSkipped, &actor, now)
                .step_id = Some(step_id);
        }

        if definition.auto_approval || total_steps == 0 {
            request.current_step = total_steps;
            request.completed_steps = total_steps;
            self.finish_approved(&mut request, &mut effects, &actor, now);
        } else {
            self.advance(&definition, &mut request, &mut effects, &actor, now)
                .await?;
        }

        let Effects {
            assignments,
            events,
            notifications,
        } = effects;
        self.storage
            .create_request(RequestCreation {
                request: request.clone(),
                assignments,
                events,
            })
            .await?;

        tracing::info!(
            request_id = %request.id,
            tenant_id = %request.tenant_id,
            entity_type = %request.entity_type,
            entity_id = %request.entity_id,
            workflow_id = %request.workflow_id,
            status = %request.status,
            total_steps = request.total_steps,
            "Approval request submitted"
        );

        self.after_commit(&request, notifications).await;
        Ok(request)
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Approve, reject or escalate one pending assignment.
    ///
    /// Exactly one of several concurrent actions on the same assignment
    /// succeeds; the others fail with `Conflict`.
    pub async fn submit_action(&self, action: StepAction) -> ApprovalResult<ApprovalRequest> {
        self.act(action, Utc::now()).await
    }

    pub(crate) async fn act(
        &self,
        action: StepAction,
        now: DateTime<Utc>,
    ) -> ApprovalResult<ApprovalRequest> {
        let request = self
            .get_request(&action.tenant_id, &action.request_id)
            .await?;
        let assignment = self
            .storage
            .get_assignment(&action.assignment_id)
            .await?
            .filter(|a| a.request_id == request.id)
            .ok_or_else(|| {
                ApprovalError::NotFound(format!(
                    "assignment {} on request {}",
                    action.assignment_id, request.id
                ))
            })?;

        if !assignment.is_pending() {
            return Err(ApprovalError::Conflict(format!(
                "assignment {} is already {}",
                assignment.id, assignment.status
            )));
        }
        if !request.is_pending() {
            return Err(ApprovalError::Conflict(format!(
                "request {} is {}",
                request.id, request.status
            )));
        }
        if request.current_step_id() != Some(&assignment.step_id) {
            return Err(ApprovalError::Conflict(format!(
                "assignment {} is not on the current step of request {}",
                assignment.id, request.id
            )));
        }
        if action.action != ApprovalAction::Escalate && action.actor != assignment.user_id {
            return Err(ApprovalError::Forbidden(format!(
                "{} cannot {} assignment {} held by {}",
                action.actor, action.action, assignment.id, assignment.user_id
            )));
        }

        let definition = self
            .definition_version(&request.workflow_id, request.workflow_version)
            .await?;

        let expected_version = request.version;
        let mut next = request.clone();
        next.version += 1;
        next.updated_at = now;

        let mut settled = assignment.clone();
        settled.status = action.action.settles_as();
        settled.completed_at = Some(now);
        settled.acted_by = Some(action.actor.clone());
        settled.comments = action.comments.clone();

        let mut effects = Effects::default();
        match action.action {
            ApprovalAction::Approve => {
                let event = effects.event(&next, EventKind::StepApproved, &action.actor, now);
                event.step_id = Some(assignment.step_id.clone());
                event.assignment_id = Some(assignment.id.clone());
                event.message = action.comments.clone();

                next.completed_steps += 1;
                if next.is_last_step() {
                    self.finish_approved(&mut next, &mut effects, &action.actor, now);
                } else {
                    next.current_step += 1;
                    self.advance(&definition, &mut next, &mut effects, &action.actor, now)
                        .await?;
                }
            }
            ApprovalAction::Reject => {
                let event = effects.event(&next, EventKind::StepRejected, &action.actor, now);
                event.step_id = Some(assignment.step_id.clone());
                event.assignment_id = Some(assignment.id.clone());
                event.message = action.comments.clone();

                next.completed_steps += 1;
                next.status = RequestStatus::Rejected;
                next.rejected_at = Some(now);
                next.comments = action.comments.clone();
                effects.event(&next, EventKind::RequestRejected, &action.actor, now);
                effects.notify(
                    &next,
                    next.requested_by.clone(),
                    NotificationKind::Resolved,
                    None,
                    Vec::new(),
                    format!("{} {} was rejected", next.entity_type, next.entity_id),
                );
            }
            ApprovalAction::Escalate => {
                self.escalate(
                    &definition,
                    &mut next,
                    &assignment,
                    &mut settled,
                    &action,
                    &mut effects,
                    now,
                )
                .await?;
            }
        }

        let Effects {
            assignments,
            events,
            notifications,
        } = effects;
        self.storage
            .commit(RequestTransition {
                request: next.clone(),
                expected_version,
                settled: Some(settled),
                new_assignments: assignments,
                events,
            })
            .await?;

        tracing::info!(
            request_id = %next.id,
            assignment_id = %assignment.id,
            action = %action.action,
            actor = %action.actor,
            status = %next.status,
            current_step = next.current_step,
            completed_steps = next.completed_steps,
            "Approval action applied"
        );

        self.after_commit(&next, notifications).await;
        Ok(next)
    }

    /// Hand an `escalated` request to a person chosen by an administrator.
    ///
    /// Creates a fresh assignment on the current step and returns the
    /// request to `pending`.
    pub async fn reassign_escalated(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
        assignee: UserId,
        actor: UserId,
    ) -> ApprovalResult<ApprovalRequest> {
        let now = Utc::now();
        let request = self.get_request(tenant_id, request_id).await?;
        if request.status != RequestStatus::Escalated {
            return Err(ApprovalError::Conflict(format!(
                "request {} is {}, not escalated",
                request.id, request.status
            )));
        }

        let definition = self
            .definition_version(&request.workflow_id, request.workflow_version)
            .await?;
        let step = self.current_step(&definition, &request)?;

        let sequence = self
            .storage
            .list_assignments(&request.id)
            .await?
            .iter()
            .filter(|a| a.step_id == step.id)
            .map(|a| a.sequence + 1)
            .max()
            .unwrap_or(0);

        let mut assignment = StepAssignment::new(
            request.id.clone(),
            step.id.clone(),
            step.name.clone(),
            step.order,
            assignee.clone(),
            now,
        );
        assignment.sequence = sequence;

        let expected_version = request.version;
        let mut next = request;
        next.version += 1;
        next.updated_at = now;
        next.status = RequestStatus::Pending;

        let mut effects = Effects::default();
        let event = effects.event(&next, EventKind::RequestReassigned, &actor, now);
        event.step_id = Some(step.id.clone());
        event.assignment_id = Some(assignment.id.clone());
        event.message = Some(format!("reassigned to {}", assignee));
        effects.notify(
            &next,
            assignee.clone(),
            NotificationKind::Assigned,
            Some(assignment.id.clone()),
            channels_for(&definition, &step.id),
            format!("{} {} awaits your approval", next.entity_type, next.entity_id),
        );

        let mut transition = RequestTransition::new(next.clone(), expected_version);
        transition.new_assignments.push(assignment);
        transition.events = effects.events;
        self.storage.commit(transition).await?;

        tracing::info!(
            request_id = %next.id,
            assignee = %assignee,
            actor = %actor,
            "Escalated request reassigned"
        );

        self.after_commit(&next, effects.notifications).await;
        Ok(next)
    }

    // ── Advancement ──────────────────────────────────────────────────

    /// Walk forward from the current step until a human is needed or the
    /// plan is exhausted. Self-approving steps count as completed.
    async fn advance(
        &self,
        definition: &WorkflowDefinition,
        request: &mut ApprovalRequest,
        effects: &mut Effects,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> ApprovalResult<()> {
        loop {
            let step = self.current_step(definition, request)?;
            let resolution = self
                .resolver
                .resolve(step, &request.company_id, &request.metadata)
                .await?;

            match resolution {
                Resolution::Approver(user) => {
                    let assignment = StepAssignment::new(
                        request.id.clone(),
                        step.id.clone(),
                        step.name.clone(),
                        step.order,
                        user.clone(),
                        now,
                    );
                    let event = effects.event(request, EventKind::StepAssigned, actor, now);
                    event.step_id = Some(step.id.clone());
                    event.assignment_id = Some(assignment.id.clone());
                    event.message = Some(format!("assigned to {}", user));
                    effects.notify(
                        request,
                        user,
                        NotificationKind::Assigned,
                        Some(assignment.id.clone()),
                        channels_for(definition, &step.id),
                        format!(
                            "{} {} awaits your approval ({})",
                            request.entity_type, request.entity_id, step.name
                        ),
                    );
                    effects.assignments.push(assignment);
                    return Ok(());
                }
                Resolution::AutoApprove => {
                    effects
                        .event(request, EventKind::StepAutoApproved, actor, now)
                        .step_id = Some(step.id.clone());
                }
                Resolution::Unresolvable(reason) if !step.is_required => {
                    tracing::debug!(
                        request_id = %request.id,
                        step_id = %step.id,
                        reason = %reason,
                        "Optional step skipped"
                    );
                    let event = effects.event(request, EventKind::StepSkipped, actor, now);
                    event.step_id = Some(step.id.clone());
                    event.message = Some(reason);
                    request.skipped_steps.push(step.id.clone());
                }
                Resolution::Unresolvable(reason) => {
                    return Err(ApprovalError::Unresolvable {
                        step: step.id.clone(),
                        reason,
                    });
                }
            }

            request.completed_steps += 1;
            if request.is_last_step() {
                self.finish_approved(request, effects, actor, now);
                return Ok(());
            }
            request.current_step += 1;
        }
    }

    /// Escalate `assignment` one tier. The first escalation of a step goes
    /// to the rule's target, later ones climb the ladder. With nobody left
    /// to climb to, the request itself becomes `escalated`.
    #[allow(clippy::too_many_arguments)]
    async fn escalate(
        &self,
        definition: &WorkflowDefinition,
        request: &mut ApprovalRequest,
        assignment: &StepAssignment,
        settled: &mut StepAssignment,
        action: &StepAction,
        effects: &mut Effects,
        now: DateTime<Utc>,
    ) -> ApprovalResult<()> {
        let rule = definition
            .escalation_rule_for(&assignment.step_id)
            .ok_or_else(|| {
                ApprovalError::Unsupported(format!(
                    "step {} has no escalation rule",
                    assignment.step_id
                ))
            })?;

        let reason = action
            .escalation_reason
            .clone()
            .unwrap_or_else(|| "escalated".to_string());
        settled.escalation_reason = Some(reason.clone());

        let tier = match assignment.escalation_level {
            None => Some(rule.escalate_to),
            Some(level) => level.next(),
        };

        let target = match tier {
            Some(tier) => {
                let user = self
                    .resolver
                    .escalation_target(rule, tier, &request.company_id, &assignment.user_id)
                    .await?
                    .ok_or_else(|| ApprovalError::Unresolvable {
                        step: assignment.step_id.clone(),
                        reason: format!(
                            "no {} escalation contact for {}",
                            tier, assignment.user_id
                        ),
                    })?;
                Some((tier, user)).filter(|(_, user)| user != &assignment.user_id)
            }
            None => None,
        };

        match target {
            Some((tier, user)) => {
                settled.escalated_to = Some(user.clone());
                let successor = assignment.escalated_successor(user.clone(), tier, now);

                let event = effects.event(request, EventKind::StepEscalated, &action.actor, now);
                event.step_id = Some(assignment.step_id.clone());
                event.assignment_id = Some(assignment.id.clone());
                event.message = Some(format!("to {} ({}): {}", user, tier, reason));
                effects.notify(
                    request,
                    user,
                    NotificationKind::Escalated,
                    Some(successor.id.clone()),
                    rule.notification_channels.clone(),
                    format!(
                        "{} {} was escalated to you: {}",
                        request.entity_type, request.entity_id, reason
                    ),
                );
                effects.assignments.push(successor);
            }
            None => {
                tracing::warn!(
                    request_id = %request.id,
                    step_id = %assignment.step_id,
                    assignee = %assignment.user_id,
                    "Escalation ladder exhausted"
                );
                request.status = RequestStatus::Escalated;

                let event = effects.event(request, EventKind::StepEscalated, &action.actor, now);
                event.step_id = Some(assignment.step_id.clone());
                event.assignment_id = Some(assignment.id.clone());
                event.message = Some(reason);
                effects
                    .event(request, EventKind::EscalationExhausted, &action.actor, now)
                    .message = Some("no further escalation target".to_string());
            }
        }
        Ok(())
    }

    fn finish_approved(
        &self,
        request: &mut ApprovalRequest,
        effects: &mut Effects,
        actor: &UserId,
        now: DateTime<Utc>,
    ) {
        request.status = RequestStatus::Approved;
        request.approved_at = Some(now);
        effects.event(request, EventKind::RequestApproved, actor, now);
        effects.notify(
            request,
            request.requested_by.clone(),
            NotificationKind::Resolved,
            None,
            Vec::new(),
            format!("{} {} was approved", request.entity_type, request.entity_id),
        );
    }

    fn current_step<'d>(
        &self,
        definition: &'d WorkflowDefinition,
        request: &ApprovalRequest,
    ) -> ApprovalResult<&'d StepDefinition> {
        request
            .current_step_id()
            .and_then(|id| definition.step(id))
            .ok_or_else(|| {
                ApprovalError::NotFound(format!(
                    "step {} of workflow {} v{}",
                    request.current_step, definition.id, definition.version
                ))
            })
    }
}
