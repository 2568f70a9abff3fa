//! Identifiers used across the approval domain
//!
//! All identifiers are opaque strings. Generated identifiers are UUID v4,
//! but callers may supply their own (e.g. ids issued by the surrounding
//! back-office system).

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Tenant that owns definitions, requests and assignments
    TenantId
);
string_id!(
    /// Company within a tenant
    CompanyId
);
string_id!(
    /// A user of the back office (requester, approver, escalation target)
    UserId
);
string_id!(
    /// Workflow definition identifier (stable across versions)
    WorkflowId
);
string_id!(
    /// Step identifier, unique within one workflow definition
    StepId
);
string_id!(
    /// Approval request identifier
    RequestId
);
string_id!(
    /// Step assignment identifier
    AssignmentId
);
string_id!(
    /// Identifier of the business object under approval (invoice id, bill id, ...)
    EntityId
);
string_id!(
    /// Audit event identifier
    EventId
);
