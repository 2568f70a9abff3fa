//! In-memory reference implementation of the approval storage traits.
//!
//! This adapter is deterministic and test-friendly. All request, assignment
//! and event state sits behind one lock so `commit` is atomic. Production
//! deployments should use the PostgreSQL adapter.

use crate::model::{RequestCreation, RequestTransition, TenantAssignment};
use crate::traits::{ApprovalStore, QueryWindow, WorkflowStore};
use crate::{StorageError, StorageResult};
use approval_types::{
    ApprovalEvent, ApprovalRequest, AssignmentId, EntityId, EntityType, RequestId, StepAssignment,
    TenantId, UserId, WorkflowDefinition, WorkflowId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
struct Ledger {
    requests: HashMap<RequestId, ApprovalRequest>,
    assignments: HashMap<AssignmentId, StepAssignment>,
    /// Assignment ids per request in insertion order
    by_request: HashMap<RequestId, Vec<AssignmentId>>,
    events: Vec<ApprovalEvent>,
}

impl Ledger {
    fn open_request_for(
        &self,
        tenant_id: &TenantId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Option<&ApprovalRequest> {
        self.requests.values().find(|r| {
            r.is_open()
                && &r.tenant_id == tenant_id
                && r.entity_type == entity_type
                && &r.entity_id == entity_id
        })
    }

    fn insert_assignments(&mut self, assignments: Vec<StepAssignment>) {
        for assignment in assignments {
            self.by_request
                .entry(assignment.request_id.clone())
                .or_default()
                .push(assignment.id.clone());
            self.assignments.insert(assignment.id.clone(), assignment);
        }
    }
}

/// In-memory approval storage adapter.
#[derive(Default)]
pub struct InMemoryApprovalStorage {
    definitions: RwLock<HashMap<WorkflowId, BTreeMap<u32, WorkflowDefinition>>>,
    ledger: RwLock<Ledger>,
}

impl InMemoryApprovalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_ledger(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Ledger>> {
        self.ledger
            .read()
            .map_err(|_| StorageError::Backend("approval ledger lock poisoned".to_string()))
    }

    fn write_ledger(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Ledger>> {
        self.ledger
            .write()
            .map_err(|_| StorageError::Backend("approval ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl WorkflowStore for InMemoryApprovalStorage {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> StorageResult<()> {
        let mut guard = self
            .definitions
            .write()
            .map_err(|_| StorageError::Backend("definitions lock poisoned".to_string()))?;
        let versions = guard.entry(definition.id.clone()).or_default();
        if versions.contains_key(&definition.version) {
            return Err(StorageError::Conflict(format!(
                "workflow {} version {} already exists",
                definition.id, definition.version
            )));
        }
        versions.insert(definition.version, definition);
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &WorkflowId,
        version: u32,
    ) -> StorageResult<Option<WorkflowDefinition>> {
        let guard = self
            .definitions
            .read()
            .map_err(|_| StorageError::Backend("definitions lock poisoned".to_string()))?;
        Ok(guard.get(id).and_then(|v| v.get(&version)).cloned())
    }

    async fn latest_definition(&self, id: &WorkflowId) -> StorageResult<Option<WorkflowDefinition>> {
        let guard = self
            .definitions
            .read()
            .map_err(|_| StorageError::Backend("definitions lock poisoned".to_string()))?;
        Ok(guard
            .get(id)
            .and_then(|v| v.values().next_back())
            .cloned())
    }

    async fn latest_definitions(
        &self,
        tenant_id: Option<&TenantId>,
    ) -> StorageResult<Vec<WorkflowDefinition>> {
        let guard = self
            .definitions
            .read()
            .map_err(|_| StorageError::Backend("definitions lock poisoned".to_string()))?;
        let mut latest = guard
            .values()
            .filter_map(|v| v.values().next_back())
            .filter(|d| tenant_id.map_or(true, |t| &d.tenant_id == t))
            .cloned()
            .collect::<Vec<_>>();
        latest.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(latest)
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStorage {
    async fn create_request(&self, creation: RequestCreation) -> StorageResult<()> {
        let mut ledger = self.write_ledger()?;
        let request = &creation.request;

        if ledger.requests.contains_key(&request.id) {
            return Err(StorageError::Conflict(format!(
                "request {} already exists",
                request.id
            )));
        }
        if let Some(open) =
            ledger.open_request_for(&request.tenant_id, request.entity_type, &request.entity_id)
        {
            return Err(StorageError::Conflict(format!(
                "{} {} already has open approval request {}",
                request.entity_type, request.entity_id, open.id
            )));
        }
        if let Some(stray) = creation
            .assignments
            .iter()
            .find(|a| a.request_id != request.id)
        {
            return Err(StorageError::InvalidInput(format!(
                "assignment {} does not belong to request {}",
                stray.id, request.id
            )));
        }

        ledger
            .requests
            .insert(request.id.clone(), creation.request.clone());
        ledger.insert_assignments(creation.assignments);
        ledger.events.extend(creation.events);
        Ok(())
    }

    async fn commit(&self, transition: RequestTransition) -> StorageResult<()> {
        transition.check().map_err(StorageError::InvalidInput)?;

        let mut ledger = self.write_ledger()?;
        let request_id = transition.request.id.clone();

        // Validate everything before touching state.
        let stored = ledger
            .requests
            .get(&request_id)
            .ok_or_else(|| StorageError::NotFound(format!("request {} not found", request_id)))?;
        if stored.version != transition.expected_version {
            return Err(StorageError::Conflict(format!(
                "request {} is at version {}, expected {}",
                request_id, stored.version, transition.expected_version
            )));
        }
        if let Some(settled) = &transition.settled {
            let current = ledger.assignments.get(&settled.id).ok_or_else(|| {
                StorageError::NotFound(format!("assignment {} not found", settled.id))
            })?;
            if !current.is_pending() {
                return Err(StorageError::Conflict(format!(
                    "assignment {} is already {}",
                    settled.id, current.status
                )));
            }
        }
        if let Some(dup) = transition
            .new_assignments
            .iter()
            .find(|a| ledger.assignments.contains_key(&a.id))
        {
            return Err(StorageError::Conflict(format!(
                "assignment {} already exists",
                dup.id
            )));
        }

        if let Some(settled) = transition.settled {
            ledger.assignments.insert(settled.id.clone(), settled);
        }
        ledger.insert_assignments(transition.new_assignments);
        ledger.requests.insert(request_id, transition.request);
        ledger.events.extend(transition.events);
        Ok(())
    }

    async fn get_request(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> StorageResult<Option<ApprovalRequest>> {
        let ledger = self.read_ledger()?;
        Ok(ledger
            .requests
            .get(request_id)
            .filter(|r| &r.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_open_request(
        &self,
        tenant_id: &TenantId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StorageResult<Option<ApprovalRequest>> {
        let ledger = self.read_ledger()?;
        Ok(ledger
            .open_request_for(tenant_id, entity_type, entity_id)
            .cloned())
    }

    async fn get_assignment(
        &self,
        assignment_id: &AssignmentId,
    ) -> StorageResult<Option<StepAssignment>> {
        let ledger = self.read_ledger()?;
        Ok(ledger.assignments.get(assignment_id).cloned())
    }

    async fn list_assignments(&self, request_id: &RequestId) -> StorageResult<Vec<StepAssignment>> {
        let ledger = self.read_ledger()?;
        let mut history = ledger
            .by_request
            .get(request_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| ledger.assignments.get(id).cloned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        history.sort_by_key(|a| (a.step_order, a.sequence));
        Ok(history)
    }

    async fn pending_assignments_for(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> StorageResult<Vec<StepAssignment>> {
        let ledger = self.read_ledger()?;
        let mut inbox = ledger
            .assignments
            .values()
            .filter(|a| a.is_pending() && &a.user_id == user_id)
            .filter(|a| {
                ledger
                    .requests
                    .get(&a.request_id)
                    .is_some_and(|r| &r.tenant_id == tenant_id)
            })
            .cloned()
            .collect::<Vec<_>>();
        inbox.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then(a.id.cmp(&b.id)));
        Ok(inbox)
    }

    async fn pending_assignments(
        &self,
        window: QueryWindow,
    ) -> StorageResult<Vec<TenantAssignment>> {
        let ledger = self.read_ledger()?;
        let mut pending = ledger
            .assignments
            .values()
            .filter(|a| a.is_pending())
            .filter_map(|a| {
                ledger.requests.get(&a.request_id).map(|r| TenantAssignment {
                    tenant_id: r.tenant_id.clone(),
                    assignment: a.clone(),
                })
            })
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| {
            a.assignment
                .assigned_at
                .cmp(&b.assignment.assigned_at)
                .then(a.assignment.id.cmp(&b.assignment.id))
        });
        Ok(apply_window(pending, window))
    }

    async fn list_events(&self, request_id: &RequestId) -> StorageResult<Vec<ApprovalEvent>> {
        let ledger = self.read_ledger()?;
        Ok(ledger
            .events
            .iter()
            .filter(|e| &e.request_id == request_id)
            .cloned()
            .collect())
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{
        ApprovalRequest, AssignmentStatus, CompanyId, EventKind, RequestStatus, StepId,
    };
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn request(entity: &str) -> ApprovalRequest {
        let now = Utc::now();
        ApprovalRequest {
            id: RequestId::generate(),
            tenant_id: TenantId::new("t1"),
            company_id: CompanyId::new("c1"),
            entity_type: EntityType::Invoice,
            entity_id: EntityId::new(entity),
            entity_sub_type: None,
            workflow_id: WorkflowId::new("wf"),
            workflow_version: 1,
            status: RequestStatus::Pending,
            current_step: 1,
            total_steps: 2,
            completed_steps: 0,
            plan: vec![StepId::new("s1"), StepId::new("s2")],
            skipped_steps: vec![],
            requested_by: UserId::new("clerk"),
            requested_at: now,
            approved_at: None,
            rejected_at: None,
            comments: None,
            metadata: Default::default(),
            version: 1,
            updated_at: now,
        }
    }

    fn assignment(request: &ApprovalRequest, user: &str) -> StepAssignment {
        StepAssignment::new(
            request.id.clone(),
            StepId::new("s1"),
            "Manager",
            1,
            UserId::new(user),
            Utc::now(),
        )
    }

    fn creation(request: ApprovalRequest, assignment: StepAssignment) -> RequestCreation {
        let event = ApprovalEvent::new(
            request.id.clone(),
            request.tenant_id.clone(),
            EventKind::RequestCreated,
            request.requested_by.clone(),
            Utc::now(),
        );
        RequestCreation {
            request,
            assignments: vec![assignment],
            events: vec![event],
        }
    }

    fn approve(request: &ApprovalRequest, assignment: &StepAssignment) -> RequestTransition {
        let mut next = request.clone();
        next.completed_steps = 1;
        next.current_step = 2;
        next.version = request.version + 1;
        let mut settled = assignment.clone();
        settled.status = AssignmentStatus::Approved;
        settled.completed_at = Some(Utc::now());
        let mut transition = RequestTransition::new(next, request.version);
        transition.settled = Some(settled);
        transition
    }

    #[tokio::test]
    async fn second_open_request_for_entity_conflicts() {
        let storage = InMemoryApprovalStorage::new();
        let first = request("inv-1");
        let a = assignment(&first, "alice");
        storage.create_request(creation(first, a)).await.unwrap();

        let second = request("inv-1");
        let b = assignment(&second, "alice");
        let result = storage.create_request(creation(second, b)).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let other = request("inv-2");
        let c = assignment(&other, "alice");
        storage.create_request(creation(other, c)).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_request_frees_the_entity() {
        let storage = InMemoryApprovalStorage::new();
        let first = request("inv-1");
        let a = assignment(&first, "alice");
        storage
            .create_request(creation(first.clone(), a.clone()))
            .await
            .unwrap();

        let mut transition = approve(&first, &a);
        transition.request.status = RequestStatus::Rejected;
        storage.commit(transition).await.unwrap();

        let again = request("inv-1");
        let b = assignment(&again, "bob");
        storage.create_request(creation(again, b)).await.unwrap();
    }

    #[tokio::test]
    async fn commit_settles_an_assignment_once() {
        let storage = InMemoryApprovalStorage::new();
        let req = request("inv-1");
        let a = assignment(&req, "alice");
        storage
            .create_request(creation(req.clone(), a.clone()))
            .await
            .unwrap();

        storage.commit(approve(&req, &a)).await.unwrap();
        let replay = storage.commit(approve(&req, &a)).await;
        assert!(matches!(replay, Err(StorageError::Conflict(_))));

        let stored = storage.get_request(&req.tenant_id, &req.id).await.unwrap().unwrap();
        assert_eq!(stored.completed_steps, 1);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn stale_version_conflicts_without_writing() {
        let storage = InMemoryApprovalStorage::new();
        let req = request("inv-1");
        let a = assignment(&req, "alice");
        storage
            .create_request(creation(req.clone(), a.clone()))
            .await
            .unwrap();

        let mut stale = approve(&req, &a);
        stale.expected_version = 7;
        stale.request.version = 8;
        let result = storage.commit(stale).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let current = storage.get_assignment(&a.id).await.unwrap().unwrap();
        assert!(current.is_pending());
    }

    #[tokio::test]
    async fn version_must_advance_by_one() {
        let storage = InMemoryApprovalStorage::new();
        let req = request("inv-1");
        let a = assignment(&req, "alice");
        storage
            .create_request(creation(req.clone(), a.clone()))
            .await
            .unwrap();

        let mut skip = approve(&req, &a);
        skip.request.version = req.version + 2;
        let result = storage.commit(skip).await;
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn concurrent_commits_have_one_winner() {
        let storage = Arc::new(InMemoryApprovalStorage::new());
        let req = request("inv-1");
        let a = assignment(&req, "alice");
        storage
            .create_request(creation(req.clone(), a.clone()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            let transition = approve(&req, &a);
            handles.push(tokio::spawn(async move { storage.commit(transition).await }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn history_and_inbox_ordering() {
        let storage = InMemoryApprovalStorage::new();
        let req = request("inv-1");
        let mut first = assignment(&req, "alice");
        first.assigned_at = Utc::now() - Duration::hours(30);
        storage
            .create_request(creation(req.clone(), first.clone()))
            .await
            .unwrap();

        let mut next = req.clone();
        next.version = 2;
        let mut settled = first.clone();
        settled.status = AssignmentStatus::Escalated;
        let successor = first.escalated_successor(
            UserId::new("bob"),
            approval_types::EscalationTarget::Manager,
            Utc::now(),
        );
        let mut transition = RequestTransition::new(next, 1);
        transition.settled = Some(settled);
        transition.new_assignments.push(successor.clone());
        storage.commit(transition).await.unwrap();

        let history = storage.list_assignments(&req.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 0);
        assert_eq!(history[1].sequence, 1);

        let alice = storage
            .pending_assignments_for(&req.tenant_id, &UserId::new("alice"))
            .await
            .unwrap();
        assert!(alice.is_empty());
        let bob = storage
            .pending_assignments_for(&req.tenant_id, &UserId::new("bob"))
            .await
            .unwrap();
        assert_eq!(bob[0].id, successor.id);
        let other_tenant = storage
            .pending_assignments_for(&TenantId::new("t2"), &UserId::new("bob"))
            .await
            .unwrap();
        assert!(other_tenant.is_empty());

        let events = storage.list_events(&req.id).await.unwrap();
        assert_eq!(events[0].kind, EventKind::RequestCreated);
    }

    #[tokio::test]
    async fn definitions_keep_every_version() {
        let storage = InMemoryApprovalStorage::new();
        let v1 = WorkflowDefinition::new(
            TenantId::new("t1"),
            CompanyId::new("c1"),
            "Invoices",
            EntityType::Invoice,
        );
        let v2 = v1.next_version();
        storage.insert_definition(v1.clone()).await.unwrap();
        storage.insert_definition(v2.clone()).await.unwrap();
        assert!(matches!(
            storage.insert_definition(v2.clone()).await,
            Err(StorageError::Conflict(_))
        ));

        let latest = storage.latest_definition(&v1.id).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        let first = storage.get_definition(&v1.id, 1).await.unwrap().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(storage.latest_definitions(None).await.unwrap().len(), 1);
        assert!(storage
            .latest_definitions(Some(&TenantId::new("t9")))
            .await
            .unwrap()
            .is_empty());
    }
}
