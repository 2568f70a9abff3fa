//! Engine configuration

use approval_types::UserId;
use serde::{Deserialize, Serialize};

/// Tunables for approver resolution and system-driven actions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Role that decides `amount_based` steps at or above the threshold
    pub amount_fallback_role: String,
    /// Attribute holding the amount for `amount_based` steps
    pub amount_field: String,
    /// Actor recorded for escalations raised by the monitor
    pub system_actor: UserId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amount_fallback_role: "finance_manager".to_string(),
            amount_field: "amount".to_string(),
            system_actor: UserId::new("system"),
        }
    }
}
