//! Collaborators that write to the log
//!
//! The daemon has no mail gateway and no owning ledger to call back into.
//! Both hooks emit structured events instead, so a log shipper can forward
//! them.

use approval_engine::{CollaboratorResult, EntityCallback, Notification, Notifier};
use approval_types::{EntityId, EntityType, RequestStatus};
use async_trait::async_trait;

/// Logs every notification at info level
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> CollaboratorResult<()> {
        tracing::info!(
            tenant_id = %notification.tenant_id,
            recipient = %notification.recipient,
            kind = ?notification.kind,
            request_id = %notification.request_id,
            channels = ?notification.channels,
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Logs every resolved request at info level
#[derive(Clone, Debug, Default)]
pub struct LogCallback;

#[async_trait]
impl EntityCallback for LogCallback {
    async fn on_approval_resolved(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        final_status: RequestStatus,
    ) -> CollaboratorResult<()> {
        tracing::info!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            status = %final_status,
            "Approval resolved"
        );
        Ok(())
    }
}
