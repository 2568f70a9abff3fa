//! Entity classification
//!
//! The engine never branches on the entity type. It is a classification key
//! used for workflow selection and passed through to the entity callback.

use serde::{Deserialize, Serialize};

/// Kind of business object that can go through approval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    JournalEntry,
    Invoice,
    PurchaseOrder,
    Expense,
    Bill,
    Document,
    RecurringInvoice,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::JournalEntry,
        EntityType::Invoice,
        EntityType::PurchaseOrder,
        EntityType::Expense,
        EntityType::Bill,
        EntityType::Document,
        EntityType::RecurringInvoice,
    ];

    /// Stable snake_case code, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::JournalEntry => "journal_entry",
            EntityType::Invoice => "invoice",
            EntityType::PurchaseOrder => "purchase_order",
            EntityType::Expense => "expense",
            EntityType::Bill => "bill",
            EntityType::Document => "document",
            EntityType::RecurringInvoice => "recurring_invoice",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == code)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_serde() {
        for t in EntityType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn unknown_code() {
        assert_eq!(EntityType::parse("payroll"), None);
    }
}
