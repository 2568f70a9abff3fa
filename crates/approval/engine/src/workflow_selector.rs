//! Workflow selector: picks the definition that governs an entity
//!
//! Pure over its inputs. It only looks at the definitions it is handed;
//! the caller decides which versions those are.

use crate::condition_evaluator::ConditionEvaluator;
use approval_types::{Attributes, CompanyId, EntityType, TenantId, WorkflowDefinition};
use std::cmp::Reverse;

/// Select the workflow for an entity.
///
/// Candidates are active definitions of the same tenant, company and entity
/// type whose subtype matches exactly or is unset, and whose workflow-level
/// conditions hold. Ties go to higher priority, then an exact subtype over
/// a wildcard, then the most recently updated definition. The definition id
/// makes the final order total.
pub fn select_workflow<'a>(
    candidates: impl IntoIterator<Item = &'a WorkflowDefinition>,
    tenant_id: &TenantId,
    company_id: &CompanyId,
    entity_type: EntityType,
    entity_sub_type: Option<&str>,
    attributes: &Attributes,
) -> Option<&'a WorkflowDefinition> {
    let evaluator = ConditionEvaluator::new();
    let chosen = candidates
        .into_iter()
        .filter(|d| d.covers(tenant_id, company_id, entity_type, entity_sub_type))
        .filter(|d| evaluator.evaluate(&d.conditions, attributes))
        .min_by_key(|d| {
            (
                Reverse(d.priority),
                Reverse(d.is_exact_sub_type(entity_sub_type)),
                Reverse(d.updated_at),
                d.id.clone(),
            )
        });

    match chosen {
        Some(d) => tracing::debug!(
            definition_id = %d.id,
            version = d.version,
            entity_type = %entity_type,
            "Workflow selected"
        ),
        None => tracing::debug!(entity_type = %entity_type, "No workflow matched"),
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{ApproverRule, Priority, StepDefinition};
    use chrono::{Duration, Utc};

    fn definition(name: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(
            TenantId::new("t1"),
            CompanyId::new("c1"),
            name,
            EntityType::Bill,
        )
        .with_step(StepDefinition::new("s1", "Review", 1, ApproverRule::role("ap_clerk")))
    }

    fn pick<'a>(defs: &'a [WorkflowDefinition], sub_type: Option<&str>) -> Option<&'a str> {
        select_workflow(
            defs,
            &TenantId::new("t1"),
            &CompanyId::new("c1"),
            EntityType::Bill,
            sub_type,
            &Attributes::new(),
        )
        .map(|d| d.name.as_str())
    }

    #[test]
    fn priority_outranks_subtype_precision() {
        let defs = vec![
            definition("exact").with_sub_type("utility"),
            definition("wildcard-high").with_priority(Priority::High),
        ];
        assert_eq!(pick(&defs, Some("utility")), Some("wildcard-high"));
    }

    #[test]
    fn subtype_precision_outranks_recency() {
        let mut exact = definition("exact").with_sub_type("utility");
        exact.updated_at = Utc::now() - Duration::days(30);
        let defs = vec![exact, definition("wildcard")];
        assert_eq!(pick(&defs, Some("utility")), Some("exact"));
    }

    #[test]
    fn other_entity_types_never_match() {
        let mut other = definition("expense");
        other.entity_type = EntityType::Expense;
        assert_eq!(pick(&[other], None), None);
    }
}
