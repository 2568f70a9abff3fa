//! Approval engine: the entry point callers hold
//!
//! Owns the definition cache, the approver resolver and the collaborator
//! handles. Administrative operations and read queries live here; request
//! transitions live in [`crate::state_machine`].

use crate::approver_resolver::ApproverResolver;
use crate::collaborators::{
    Directory, EntityCallback, NoopCallback, NoopNotifier, Notification, Notifier,
};
use crate::condition_evaluator::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::definition_cache::DefinitionCache;
use crate::error::{ApprovalError, ApprovalResult};
use approval_storage::ApprovalStorage;
use approval_types::{
    ApprovalEvent, ApprovalRequest, CompanyId, RequestId, StepAssignment, TenantId, UserId,
    WorkflowDefinition, WorkflowId,
};
use chrono::Utc;
use std::sync::Arc;

/// Multi-step approval engine
pub struct ApprovalEngine {
    pub(crate) storage: Arc<dyn ApprovalStorage>,
    pub(crate) definitions: DefinitionCache,
    pub(crate) resolver: ApproverResolver,
    pub(crate) evaluator: ConditionEvaluator,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) callback: Arc<dyn EntityCallback>,
    pub(crate) config: EngineConfig,
}

impl ApprovalEngine {
    /// Create an engine with no-op notification and callback hooks.
    /// Call [`ApprovalEngine::load_definitions`] before serving requests.
    pub fn new(
        storage: Arc<dyn ApprovalStorage>,
        directory: Arc<dyn Directory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            definitions: DefinitionCache::new(),
            resolver: ApproverResolver::new(directory, config.clone()),
            evaluator: ConditionEvaluator::new(),
            notifier: Arc::new(NoopNotifier),
            callback: Arc::new(NoopCallback),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn EntityCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn definitions(&self) -> &DefinitionCache {
        &self.definitions
    }

    /// Fill the definition cache from storage
    pub async fn load_definitions(&self) -> ApprovalResult<usize> {
        self.definitions.load(self.storage.as_ref()).await
    }

    // ── Definition Management ────────────────────────────────────────

    /// Validate and store a new definition as version 1
    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> ApprovalResult<WorkflowDefinition> {
        definition.validate()?;

        if self.storage.latest_definition(&definition.id).await?.is_some() {
            return Err(ApprovalError::Conflict(format!(
                "workflow {} already exists",
                definition.id
            )));
        }

        let now = Utc::now();
        let mut definition = definition;
        definition.version = 1;
        definition.created_at = now;
        definition.updated_at = now;

        self.storage.insert_definition(definition.clone()).await?;
        self.definitions.put(definition.clone())?;

        tracing::info!(
            definition_id = %definition.id,
            tenant_id = %definition.tenant_id,
            entity_type = %definition.entity_type,
            steps = definition.steps.len(),
            "Workflow definition created"
        );
        Ok(definition)
    }

    /// Store `definition` as the next version of an existing workflow.
    ///
    /// In-flight requests keep running on the version they started with.
    pub async fn update_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> ApprovalResult<WorkflowDefinition> {
        definition.validate()?;
        let current = self
            .current_definition(&definition.tenant_id, &definition.id)
            .await?;

        let mut next = definition;
        next.version = current.version + 1;
        next.created_at = current.created_at;
        next.updated_at = Utc::now();

        self.storage.insert_definition(next.clone()).await?;
        self.definitions.put(next.clone())?;

        tracing::info!(
            definition_id = %next.id,
            version = next.version,
            "Workflow definition updated"
        );
        Ok(next)
    }

    /// Store an inactive successor version; the workflow stops matching new
    /// submissions. Deactivating an inactive workflow is a no-op.
    pub async fn deactivate_workflow(
        &self,
        tenant_id: &TenantId,
        id: &WorkflowId,
    ) -> ApprovalResult<WorkflowDefinition> {
        let current = self.current_definition(tenant_id, id).await?;
        if !current.is_active {
            return Ok(current);
        }

        let mut next = current.next_version();
        next.is_active = false;
        self.storage.insert_definition(next.clone()).await?;
        self.definitions.put(next.clone())?;

        tracing::info!(definition_id = %id, version = next.version, "Workflow definition deactivated");
        Ok(next)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Latest version of a workflow
    pub async fn get_workflow(
        &self,
        tenant_id: &TenantId,
        id: &WorkflowId,
    ) -> ApprovalResult<WorkflowDefinition> {
        self.current_definition(tenant_id, id).await
    }

    /// Latest versions of a company's workflows, ordered by name
    pub fn list_workflows(
        &self,
        tenant_id: &TenantId,
        company_id: &CompanyId,
    ) -> ApprovalResult<Vec<WorkflowDefinition>> {
        self.definitions.list(tenant_id, company_id)
    }

    pub async fn get_request(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> ApprovalResult<ApprovalRequest> {
        self.storage
            .get_request(tenant_id, request_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(format!("request {}", request_id)))
    }

    /// Full assignment history, by step order then escalation sequence
    pub async fn list_assignments(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> ApprovalResult<Vec<StepAssignment>> {
        let request = self.get_request(tenant_id, request_id).await?;
        Ok(self.storage.list_assignments(&request.id).await?)
    }

    /// An approver's inbox, oldest first
    pub async fn pending_assignments_for(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> ApprovalResult<Vec<StepAssignment>> {
        Ok(self
            .storage
            .pending_assignments_for(tenant_id, user_id)
            .await?)
    }

    /// Audit trail of a request
    pub async fn request_events(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> ApprovalResult<Vec<ApprovalEvent>> {
        let request = self.get_request(tenant_id, request_id).await?;
        Ok(self.storage.list_events(&request.id).await?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn current_definition(
        &self,
        tenant_id: &TenantId,
        id: &WorkflowId,
    ) -> ApprovalResult<WorkflowDefinition> {
        let latest = match self.definitions.get(id)? {
            Some(cached) => Some(cached),
            None => self.storage.latest_definition(id).await?,
        };
        latest
            .filter(|d| &d.tenant_id == tenant_id)
            .ok_or_else(|| ApprovalError::NotFound(format!("workflow {}", id)))
    }

    /// The exact definition version a request runs on
    pub(crate) async fn definition_version(
        &self,
        id: &WorkflowId,
        version: u32,
    ) -> ApprovalResult<WorkflowDefinition> {
        if let Some(cached) = self.definitions.get(id)?.filter(|d| d.version == version) {
            return Ok(cached);
        }
        self.storage
            .get_definition(id, version)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(format!("workflow {} version {}", id, version)))
    }

    /// Side effects after a successful commit. Failures are logged and
    /// never undo the committed transition.
    pub(crate) async fn after_commit(
        &self,
        request: &ApprovalRequest,
        notifications: Vec<Notification>,
    ) {
        for notification in notifications {
            let recipient = notification.recipient.clone();
            if let Err(e) = self.notifier.notify(notification).await {
                tracing::warn!(
                    request_id = %request.id,
                    recipient = %recipient,
                    error = %e,
                    "Notification failed"
                );
            }
        }

        if request.is_terminal() {
            if let Err(e) = self
                .callback
                .on_approval_resolved(request.entity_type, &request.entity_id, request.status)
                .await
            {
                tracing::warn!(
                    request_id = %request.id,
                    entity_id = %request.entity_id,
                    status = %request.status,
                    error = %e,
                    "Entity callback failed"
                );
            }
        }
    }
}
