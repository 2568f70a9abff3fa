use approval_types::{ApprovalEvent, ApprovalRequest, StepAssignment, TenantId};
use serde::{Deserialize, Serialize};

/// Everything written when a request is created.
///
/// Stored as one unit: the request, the assignment for the first human step
/// (if any) and the creation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCreation {
    pub request: ApprovalRequest,
    pub assignments: Vec<StepAssignment>,
    pub events: Vec<ApprovalEvent>,
}

/// A pending assignment together with the tenant of its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAssignment {
    pub tenant_id: TenantId,
    pub assignment: StepAssignment,
}

/// One atomic state change of an existing request.
///
/// The store applies it only if the request is still at `expected_version`
/// and, when `settled` is present, the stored assignment is still `pending`.
/// Otherwise nothing is written and `StorageError::Conflict` is returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTransition {
    /// New request state; its `version` must be `expected_version + 1`
    pub request: ApprovalRequest,
    pub expected_version: u64,
    /// The acted-on assignment in its final (non-pending) state
    pub settled: Option<StepAssignment>,
    pub new_assignments: Vec<StepAssignment>,
    pub events: Vec<ApprovalEvent>,
}

impl RequestTransition {
    pub fn new(request: ApprovalRequest, expected_version: u64) -> Self {
        Self {
            request,
            expected_version,
            settled: None,
            new_assignments: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Structural checks shared by every backend
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.request.version != self.expected_version + 1 {
            return Err(format!(
                "request {} version must advance by one (expected {}, got {})",
                self.request.id,
                self.expected_version + 1,
                self.request.version
            ));
        }
        if let Some(settled) = &self.settled {
            if settled.is_pending() {
                return Err(format!("assignment {} settled as pending", settled.id));
            }
            if settled.request_id != self.request.id {
                return Err(format!(
                    "assignment {} does not belong to request {}",
                    settled.id, self.request.id
                ));
            }
        }
        if let Some(stray) = self
            .new_assignments
            .iter()
            .find(|a| a.request_id != self.request.id || !a.is_pending())
        {
            return Err(format!(
                "new assignment {} must be pending and belong to request {}",
                stray.id, self.request.id
            ));
        }
        Ok(())
    }
}
