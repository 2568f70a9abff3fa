//! Workflow definition files
//!
//! A workflow file is a JSON array of definitions in their wire format.
//! Every entry must carry an explicit `id`, otherwise each restart would
//! install a fresh copy.

use crate::error::{DaemonError, DaemonResult};
use approval_engine::{ApprovalEngine, ApprovalError};
use approval_types::WorkflowDefinition;
use std::path::Path;

/// Outcome of installing a workflow file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Read, parse and validate a workflow file
pub fn read_workflow_file(path: &Path) -> DaemonResult<Vec<WorkflowDefinition>> {
    let raw = std::fs::read_to_string(path)?;
    parse_workflows(&raw)
}

/// Parse and validate workflow definitions from JSON text
pub fn parse_workflows(raw: &str) -> DaemonResult<Vec<WorkflowDefinition>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| DaemonError::Workflows(format!("expected a JSON array: {}", e)))?;

    let mut definitions = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        if entry.get("id").and_then(|v| v.as_str()).is_none() {
            return Err(DaemonError::Workflows(format!(
                "entry {} has no \"id\"",
                index
            )));
        }
        let definition: WorkflowDefinition = serde_json::from_value(entry)
            .map_err(|e| DaemonError::Workflows(format!("entry {}: {}", index, e)))?;
        definition.validate().map_err(|e| {
            DaemonError::Workflows(format!("workflow {} ({}): {}", definition.id, definition.name, e))
        })?;
        definitions.push(definition);
    }
    Ok(definitions)
}

/// Install definitions into the engine: new ids are created, changed ones
/// stored as a new version, identical ones left alone.
pub async fn install(
    engine: &ApprovalEngine,
    definitions: Vec<WorkflowDefinition>,
) -> DaemonResult<InstallSummary> {
    let mut summary = InstallSummary::default();
    for definition in definitions {
        match engine.get_workflow(&definition.tenant_id, &definition.id).await {
            Ok(current) if same_content(&current, &definition) => summary.unchanged += 1,
            Ok(_) => {
                engine.update_workflow(definition).await?;
                summary.updated += 1;
            }
            Err(ApprovalError::NotFound(_)) => {
                engine.create_workflow(definition).await?;
                summary.created += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "Workflow definitions installed"
    );
    Ok(summary)
}

/// Equality ignoring version bookkeeping.
///
/// A definition deactivated at runtime stays inactive: the file's
/// `isActive` alone does not count as a change.
fn same_content(stored: &WorkflowDefinition, incoming: &WorkflowDefinition) -> bool {
    let mut incoming = incoming.clone();
    incoming.version = stored.version;
    incoming.created_at = stored.created_at;
    incoming.updated_at = stored.updated_at;
    if !stored.is_active {
        incoming.is_active = false;
    }
    &incoming == stored
}
