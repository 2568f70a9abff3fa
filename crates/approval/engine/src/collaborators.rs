//! External collaborators the engine consumes
//!
//! The engine never talks to an identity system, a mail server or the
//! owning ledger directly. It calls these traits:
//!
//! - [`Directory`] resolves roles, departments and escalation contacts.
//! - [`Notifier`] tells people about new work. Failures are logged only.
//! - [`EntityCallback`] tells the owning module a request is resolved.
//!   Called after commit; failures are logged only.

use approval_types::{
    AssignmentId, CompanyId, EntityId, EntityType, EscalationTarget, NotificationChannel,
    RequestId, RequestStatus, TenantId, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Failure reported by a collaborator
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Identity and org-chart lookups, scoped by company
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_by_role(&self, company_id: &CompanyId, role: &str)
        -> CollaboratorResult<Option<UserId>>;

    async fn find_by_department(
        &self,
        company_id: &CompanyId,
        department: &str,
    ) -> CollaboratorResult<Option<UserId>>;

    /// The escalation contact at `tier`, relative to the user currently
    /// holding the assignment. Never called with `SpecificUser`.
    async fn escalation_contact(
        &self,
        company_id: &CompanyId,
        tier: EscalationTarget,
        relative_to: &UserId,
    ) -> CollaboratorResult<Option<UserId>>;
}

/// Why someone is being notified
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new assignment landed in the recipient's inbox
    Assigned,
    /// An overdue or escalated assignment was handed to the recipient
    Escalated,
    /// The recipient's request was approved or rejected
    Resolved,
}

/// One outbound notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub request_id: RequestId,
    pub assignment_id: Option<AssignmentId>,
    pub channels: Vec<NotificationChannel>,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> CollaboratorResult<()>;
}

/// Hook into the module that owns the entity (posting a journal entry,
/// releasing an invoice, ...)
#[async_trait]
pub trait EntityCallback: Send + Sync {
    async fn on_approval_resolved(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        final_status: RequestStatus,
    ) -> CollaboratorResult<()>;
}

/// Notifier that drops everything
#[derive(Clone, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Callback that does nothing
#[derive(Clone, Debug, Default)]
pub struct NoopCallback;

#[async_trait]
impl EntityCallback for NoopCallback {
    async fn on_approval_resolved(
        &self,
        _entity_type: EntityType,
        _entity_id: &EntityId,
        _final_status: RequestStatus,
    ) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Directory backed by fixed tables, loaded from configuration.
///
/// `roles` and `departments` are keyed by company id, then by role or
/// department name. `managers` maps a user to their manager across all
/// companies; `directors` and `ceos` are keyed by company id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDirectory {
    pub roles: BTreeMap<String, BTreeMap<String, UserId>>,
    pub departments: BTreeMap<String, BTreeMap<String, UserId>>,
    pub managers: BTreeMap<String, UserId>,
    pub directors: BTreeMap<String, UserId>,
    pub ceos: BTreeMap<String, UserId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, company: &str, role: &str, user: &str) -> Self {
        self.roles
            .entry(company.to_string())
            .or_default()
            .insert(role.to_string(), UserId::new(user));
        self
    }

    pub fn with_department(mut self, company: &str, department: &str, user: &str) -> Self {
        self.departments
            .entry(company.to_string())
            .or_default()
            .insert(department.to_string(), UserId::new(user));
        self
    }

    pub fn with_manager(mut self, user: &str, manager: &str) -> Self {
        self.managers
            .insert(user.to_string(), UserId::new(manager));
        self
    }

    pub fn with_director(mut self, company: &str, director: &str) -> Self {
        self.directors
            .insert(company.to_string(), UserId::new(director));
        self
    }

    pub fn with_ceo(mut self, company: &str, ceo: &str) -> Self {
        self.ceos.insert(company.to_string(), UserId::new(ceo));
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_by_role(
        &self,
        company_id: &CompanyId,
        role: &str,
    ) -> CollaboratorResult<Option<UserId>> {
        Ok(self
            .roles
            .get(company_id.as_str())
            .and_then(|roles| roles.get(role))
            .cloned())
    }

    async fn find_by_department(
        &self,
        company_id: &CompanyId,
        department: &str,
    ) -> CollaboratorResult<Option<UserId>> {
        Ok(self
            .departments
            .get(company_id.as_str())
            .and_then(|departments| departments.get(department))
            .cloned())
    }

    async fn escalation_contact(
        &self,
        company_id: &CompanyId,
        tier: EscalationTarget,
        relative_to: &UserId,
    ) -> CollaboratorResult<Option<UserId>> {
        Ok(match tier {
            EscalationTarget::Manager => self.managers.get(relative_to.as_str()).cloned(),
            EscalationTarget::Director => self.directors.get(company_id.as_str()).cloned(),
            EscalationTarget::Ceo => self.ceos.get(company_id.as_str()).cloned(),
            EscalationTarget::SpecificUser => None,
        })
    }
}

/// Notifier that keeps every notification, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> CollaboratorResult<()> {
        self.sent
            .lock()
            .map_err(|_| CollaboratorError("recording notifier lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

/// Callback that keeps every resolution, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingCallback {
    resolved: Mutex<Vec<(EntityType, EntityId, RequestStatus)>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(&self) -> Vec<(EntityType, EntityId, RequestStatus)> {
        self.resolved.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EntityCallback for RecordingCallback {
    async fn on_approval_resolved(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        final_status: RequestStatus,
    ) -> CollaboratorResult<()> {
        self.resolved
            .lock()
            .map_err(|_| CollaboratorError("recording callback lock poisoned".to_string()))?
            .push((entity_type, entity_id.clone(), final_status));
        Ok(())
    }
}
