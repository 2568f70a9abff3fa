//! Definition cache: latest version of every workflow definition
//!
//! Definitions are immutable once stored. The cache holds only the newest
//! version of each definition, which is what selection needs; requests that
//! run on older versions read them from storage.
//!
//! Lifecycle: `load` from the workflow store at startup, `put` on every
//! administrative write, `invalidate`/`reload` on demand.

use crate::error::{ApprovalError, ApprovalResult};
use crate::workflow_selector::select_workflow;
use approval_storage::{StorageError, WorkflowStore};
use approval_types::{
    Attributes, CompanyId, EntityType, TenantId, WorkflowDefinition, WorkflowId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Cache of the latest workflow definitions
#[derive(Debug, Default)]
pub struct DefinitionCache {
    definitions: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with the latest versions from `store`
    pub async fn load<S>(&self, store: &S) -> ApprovalResult<usize>
    where
        S: WorkflowStore + ?Sized,
    {
        let latest = store.latest_definitions(None).await?;
        let count = latest.len();
        let mut guard = self.write()?;
        guard.clear();
        for definition in latest {
            guard.insert(definition.id.clone(), definition);
        }
        tracing::info!(definitions = count, "Definition cache loaded");
        Ok(count)
    }

    /// Same as [`DefinitionCache::load`], named for on-demand refreshes
    pub async fn reload<S>(&self, store: &S) -> ApprovalResult<usize>
    where
        S: WorkflowStore + ?Sized,
    {
        self.load(store).await
    }

    /// Record a newly stored version. Older versions never replace newer ones.
    pub fn put(&self, definition: WorkflowDefinition) -> ApprovalResult<()> {
        let mut guard = self.write()?;
        let stale = guard
            .get(&definition.id)
            .is_some_and(|current| current.version > definition.version);
        if !stale {
            tracing::debug!(
                definition_id = %definition.id,
                version = definition.version,
                "Definition cached"
            );
            guard.insert(definition.id.clone(), definition);
        }
        Ok(())
    }

    /// Drop one definition; the next `load` brings it back
    pub fn invalidate(&self, id: &WorkflowId) -> ApprovalResult<()> {
        self.write()?.remove(id);
        Ok(())
    }

    pub fn get(&self, id: &WorkflowId) -> ApprovalResult<Option<WorkflowDefinition>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// Latest definitions of one company, ordered by name
    pub fn list(
        &self,
        tenant_id: &TenantId,
        company_id: &CompanyId,
    ) -> ApprovalResult<Vec<WorkflowDefinition>> {
        let mut found = self
            .read()?
            .values()
            .filter(|d| &d.tenant_id == tenant_id && &d.company_id == company_id)
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    pub fn count(&self) -> usize {
        self.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Pick the workflow for an entity among the cached latest versions
    /// (see [`select_workflow`]).
    pub fn select(
        &self,
        tenant_id: &TenantId,
        company_id: &CompanyId,
        entity_type: EntityType,
        entity_sub_type: Option<&str>,
        attributes: &Attributes,
    ) -> ApprovalResult<Option<WorkflowDefinition>> {
        let guard = self.read()?;
        let chosen = select_workflow(
            guard.values(),
            tenant_id,
            company_id,
            entity_type,
            entity_sub_type,
            attributes,
        )
        .cloned();
        Ok(chosen)
    }

    fn read(
        &self,
    ) -> ApprovalResult<std::sync::RwLockReadGuard<'_, HashMap<WorkflowId, WorkflowDefinition>>>
    {
        self.definitions
            .read()
            .map_err(|_| {
                ApprovalError::Storage(StorageError::Backend(
                    "definition cache lock poisoned".to_string(),
                ))
            })
    }

    fn write(
        &self,
    ) -> ApprovalResult<std::sync::RwLockWriteGuard<'_, HashMap<WorkflowId, WorkflowDefinition>>>
    {
        self.definitions
            .write()
            .map_err(|_| {
                ApprovalError::Storage(StorageError::Backend(
                    "definition cache lock poisoned".to_string(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_storage::InMemoryApprovalStorage;
    use approval_types::{ApproverRule, Condition, Decimal, Priority, StepDefinition};
    use chrono::{Duration, Utc};

    fn definition(name: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(
            TenantId::new("t1"),
            CompanyId::new("c1"),
            name,
            EntityType::Invoice,
        )
        .with_step(StepDefinition::new("s1", "Review", 1, ApproverRule::role("manager")))
    }

    fn select(cache: &DefinitionCache, sub_type: Option<&str>, amount: i64) -> Option<String> {
        let mut attrs = Attributes::new();
        attrs.insert("amount".to_string(), Decimal::from(amount).into());
        cache
            .select(
                &TenantId::new("t1"),
                &CompanyId::new("c1"),
                EntityType::Invoice,
                sub_type,
                &attrs,
            )
            .unwrap()
            .map(|d| d.name)
    }

    #[test]
    fn higher_priority_wins() {
        let cache = DefinitionCache::new();
        cache.put(definition("medium")).unwrap();
        cache
            .put(definition("high").with_priority(Priority::High))
            .unwrap();
        assert_eq!(select(&cache, None, 10).as_deref(), Some("high"));
    }

    #[test]
    fn exact_subtype_beats_wildcard_at_equal_priority() {
        let cache = DefinitionCache::new();
        cache.put(definition("any")).unwrap();
        cache
            .put(definition("vendor").with_sub_type("vendor"))
            .unwrap();
        assert_eq!(select(&cache, Some("vendor"), 10).as_deref(), Some("vendor"));
        assert_eq!(select(&cache, Some("customer"), 10).as_deref(), Some("any"));
        assert_eq!(select(&cache, None, 10).as_deref(), Some("any"));
    }

    #[test]
    fn most_recently_updated_breaks_remaining_ties() {
        let cache = DefinitionCache::new();
        let mut old = definition("old");
        old.updated_at = Utc::now() - Duration::days(3);
        cache.put(old).unwrap();
        cache.put(definition("new")).unwrap();
        assert_eq!(select(&cache, None, 10).as_deref(), Some("new"));
    }

    #[test]
    fn workflow_conditions_and_activity_filter_candidates() {
        let cache = DefinitionCache::new();
        cache
            .put(
                definition("large")
                    .with_priority(Priority::High)
                    .with_condition(Condition::greater_than("amount", 10_000)),
            )
            .unwrap();
        let mut inactive = definition("inactive").with_priority(Priority::Critical);
        inactive.is_active = false;
        cache.put(inactive).unwrap();
        cache.put(definition("default")).unwrap();

        assert_eq!(select(&cache, None, 50_000).as_deref(), Some("large"));
        assert_eq!(select(&cache, None, 500).as_deref(), Some("default"));
    }

    #[test]
    fn other_scope_is_never_selected() {
        let cache = DefinitionCache::new();
        let mut elsewhere = definition("elsewhere");
        elsewhere.company_id = CompanyId::new("c2");
        cache.put(elsewhere).unwrap();
        assert_eq!(select(&cache, None, 10), None);
    }

    #[test]
    fn stale_version_does_not_replace_newer() {
        let cache = DefinitionCache::new();
        let v1 = definition("wf");
        let v2 = v1.next_version().with_description("second");
        cache.put(v2.clone()).unwrap();
        cache.put(v1.clone()).unwrap();
        assert_eq!(cache.get(&v1.id).unwrap().unwrap().version, 2);

        cache.invalidate(&v1.id).unwrap();
        assert_eq!(cache.count(), 0);
    }

    #[tokio::test]
    async fn load_reads_latest_versions_from_store() {
        let store = InMemoryApprovalStorage::new();
        let v1 = definition("wf");
        let v2 = v1.next_version();
        store.insert_definition(v1.clone()).await.unwrap();
        store.insert_definition(v2).await.unwrap();

        let cache = DefinitionCache::new();
        assert_eq!(cache.load(&store).await.unwrap(), 1);
        assert_eq!(cache.get(&v1.id).unwrap().unwrap().version, 2);
        assert_eq!(
            cache
                .list(&TenantId::new("t1"), &CompanyId::new("c1"))
                .unwrap()
                .len(),
            1
        );

        cache.invalidate(&v1.id).unwrap();
        assert!(cache.get(&v1.id).unwrap().is_none());
        assert_eq!(cache.reload(&store).await.unwrap(), 1);
        assert!(cache.get(&v1.id).unwrap().is_some());
    }
}
