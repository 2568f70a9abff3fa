#![allow(dead_code)]

use approval_engine::{
    ApprovalEngine, EngineConfig, RecordingCallback, RecordingNotifier, StaticDirectory,
    StepAction, Submission,
};
use approval_storage::InMemoryApprovalStorage;
use approval_types::*;
use std::sync::Arc;

pub struct Harness {
    pub engine: Arc<ApprovalEngine>,
    pub storage: Arc<InMemoryApprovalStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub callback: Arc<RecordingCallback>,
}

pub fn tenant() -> TenantId {
    TenantId::new("t1")
}

pub fn company() -> CompanyId {
    CompanyId::new("acme")
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// mia (manager) reports to max, max to mona; dora directs, carl runs acme
pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_role("acme", "manager", "mia")
        .with_role("acme", "finance_manager", "fiona")
        .with_department("acme", "procurement", "pat")
        .with_manager("mia", "max")
        .with_manager("max", "mona")
        .with_director("acme", "dora")
        .with_ceo("acme", "carl")
}

pub fn harness() -> Harness {
    harness_with(directory())
}

pub fn harness_with(directory: StaticDirectory) -> Harness {
    let storage = Arc::new(InMemoryApprovalStorage::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let callback = Arc::new(RecordingCallback::new());
    let engine = ApprovalEngine::new(storage.clone(), Arc::new(directory), EngineConfig::default())
        .with_notifier(notifier.clone())
        .with_callback(callback.clone());
    Harness {
        engine: Arc::new(engine),
        storage,
        notifier,
        callback,
    }
}

pub fn workflow(name: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(tenant(), company(), name, EntityType::Invoice)
}

/// Manager review, then an amount check at 1000
pub fn two_step_workflow() -> WorkflowDefinition {
    workflow("Invoice approval")
        .with_step(StepDefinition::new("manager", "Manager review", 1, ApproverRule::role("manager")))
        .with_step(StepDefinition::new("amount", "Amount check", 2, ApproverRule::amount_based(1000)))
}

pub fn invoice(entity_id: &str, amount: i64) -> Submission {
    Submission::new(tenant(), company(), EntityType::Invoice, entity_id, user("clerk"))
        .with_attribute("amount", amount)
}

impl Harness {
    pub async fn install(&self, definition: WorkflowDefinition) -> WorkflowDefinition {
        self.engine.create_workflow(definition).await.unwrap()
    }

    /// The single pending assignment in `who`'s inbox
    pub async fn inbox_one(&self, who: &str) -> StepAssignment {
        let mut inbox = self
            .engine
            .pending_assignments_for(&tenant(), &user(who))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1, "{} should have exactly one pending assignment", who);
        inbox.remove(0)
    }

    pub async fn inbox_len(&self, who: &str) -> usize {
        self.engine
            .pending_assignments_for(&tenant(), &user(who))
            .await
            .unwrap()
            .len()
    }

    pub async fn approve_as(
        &self,
        who: &str,
        request: &ApprovalRequest,
    ) -> approval_engine::ApprovalResult<ApprovalRequest> {
        let assignment = self.inbox_one(who).await;
        self.engine
            .submit_action(StepAction::approve(
                tenant(),
                request.id.clone(),
                assignment.id,
                user(who),
            ))
            .await
    }

    pub async fn escalate(
        &self,
        request: &ApprovalRequest,
        assignment: &StepAssignment,
    ) -> approval_engine::ApprovalResult<ApprovalRequest> {
        self.engine
            .submit_action(
                StepAction::escalate(
                    tenant(),
                    request.id.clone(),
                    assignment.id.clone(),
                    user("admin"),
                )
                .with_reason("stuck"),
            )
            .await
    }

    pub async fn reload(&self, request: &ApprovalRequest) -> ApprovalRequest {
        self.engine.get_request(&tenant(), &request.id).await.unwrap()
    }

    pub async fn event_kinds(&self, request: &ApprovalRequest) -> Vec<EventKind> {
        self.engine
            .request_events(&tenant(), &request.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }
}
