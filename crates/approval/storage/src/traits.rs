use crate::model::{RequestCreation, RequestTransition, TenantAssignment};
use crate::StorageResult;
use approval_types::{
    ApprovalEvent, ApprovalRequest, AssignmentId, EntityId, EntityType, RequestId, StepAssignment,
    TenantId, UserId, WorkflowDefinition, WorkflowId,
};
use async_trait::async_trait;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Storage interface for versioned workflow definitions.
///
/// Definitions are never updated in place; every version is its own row.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a definition version. Conflict if `(id, version)` already exists.
    async fn insert_definition(&self, definition: WorkflowDefinition) -> StorageResult<()>;

    /// Get one exact version.
    async fn get_definition(
        &self,
        id: &WorkflowId,
        version: u32,
    ) -> StorageResult<Option<WorkflowDefinition>>;

    /// Get the highest stored version.
    async fn latest_definition(&self, id: &WorkflowId) -> StorageResult<Option<WorkflowDefinition>>;

    /// Latest version of every definition, optionally limited to one tenant.
    async fn latest_definitions(
        &self,
        tenant_id: Option<&TenantId>,
    ) -> StorageResult<Vec<WorkflowDefinition>>;
}

/// Storage interface for approval requests, assignments and their audit trail.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert a new request with its initial assignments and events.
    ///
    /// Conflict if another open (pending or escalated) request exists for the
    /// same `(tenant, entity type, entity id)`.
    async fn create_request(&self, creation: RequestCreation) -> StorageResult<()>;

    /// Apply a state change atomically (see [`RequestTransition`]).
    async fn commit(&self, transition: RequestTransition) -> StorageResult<()>;

    async fn get_request(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> StorageResult<Option<ApprovalRequest>>;

    /// The open request for an entity, if any.
    async fn find_open_request(
        &self,
        tenant_id: &TenantId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StorageResult<Option<ApprovalRequest>>;

    async fn get_assignment(
        &self,
        assignment_id: &AssignmentId,
    ) -> StorageResult<Option<StepAssignment>>;

    /// Full assignment history of a request, by step order then sequence.
    async fn list_assignments(&self, request_id: &RequestId) -> StorageResult<Vec<StepAssignment>>;

    /// Pending assignments of one approver, oldest first.
    async fn pending_assignments_for(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> StorageResult<Vec<StepAssignment>>;

    /// Pending assignments across all tenants, oldest first.
    async fn pending_assignments(
        &self,
        window: QueryWindow,
    ) -> StorageResult<Vec<TenantAssignment>>;

    /// Audit trail of a request in append order.
    async fn list_events(&self, request_id: &RequestId) -> StorageResult<Vec<ApprovalEvent>>;
}

/// Storage bundle used by the approval engine.
pub trait ApprovalStorage: WorkflowStore + ApprovalStore + Send + Sync {}

impl<T> ApprovalStorage for T where T: WorkflowStore + ApprovalStore + Send + Sync {}
