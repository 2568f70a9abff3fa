//! Gating conditions for workflows and steps
//!
//! A condition compares one attribute of the entity snapshot against a typed
//! operand. Operands are checked when the condition is built or deserialized,
//! so a stored definition can never hold e.g. a `greater_than` against text.
//!
//! Conditions in a list are joined left to right: the logical operator
//! attached to a condition decides how it combines with the *next* one.

use crate::{AttributeValue, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Comparison operator as it appears in definitions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    In,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::Contains => "contains",
            ConditionOperator::In => "in",
        }
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition joins with the one after it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// A validated comparison with its typed operand
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Scalar equality (numbers compare by value, not scale)
    Equals(AttributeValue),
    GreaterThan(Decimal),
    LessThan(Decimal),
    /// Substring of a text attribute, or membership in a list attribute
    Contains(AttributeValue),
    /// Attribute is one of the listed scalars
    In(Vec<AttributeValue>),
}

impl Predicate {
    pub fn operator(&self) -> ConditionOperator {
        match self {
            Predicate::Equals(_) => ConditionOperator::Equals,
            Predicate::GreaterThan(_) => ConditionOperator::GreaterThan,
            Predicate::LessThan(_) => ConditionOperator::LessThan,
            Predicate::Contains(_) => ConditionOperator::Contains,
            Predicate::In(_) => ConditionOperator::In,
        }
    }

    /// The operand in its wire form
    pub fn operand(&self) -> AttributeValue {
        match self {
            Predicate::Equals(v) | Predicate::Contains(v) => v.clone(),
            Predicate::GreaterThan(n) | Predicate::LessThan(n) => AttributeValue::Number(*n),
            Predicate::In(items) => AttributeValue::List(items.clone()),
        }
    }

    fn compile(
        field: &str,
        operator: ConditionOperator,
        value: AttributeValue,
    ) -> Result<Self, ValidationError> {
        let mismatch = |expected: &'static str, found: &AttributeValue| {
            ValidationError::OperandType {
                field: field.to_string(),
                operator,
                expected,
                found: found.type_name(),
            }
        };

        match operator {
            ConditionOperator::Equals => {
                if value.is_scalar() {
                    Ok(Predicate::Equals(value))
                } else {
                    Err(mismatch("a scalar", &value))
                }
            }
            ConditionOperator::GreaterThan => value
                .as_number()
                .map(Predicate::GreaterThan)
                .ok_or_else(|| mismatch("a number", &value)),
            ConditionOperator::LessThan => value
                .as_number()
                .map(Predicate::LessThan)
                .ok_or_else(|| mismatch("a number", &value)),
            ConditionOperator::Contains => {
                if value.is_scalar() {
                    Ok(Predicate::Contains(value))
                } else {
                    Err(mismatch("a scalar", &value))
                }
            }
            ConditionOperator::In => match value {
                AttributeValue::List(items) if !items.is_empty() => {
                    if let Some(nested) = items.iter().find(|i| !i.is_scalar()) {
                        return Err(mismatch("a list of scalars", nested));
                    }
                    Ok(Predicate::In(items))
                }
                AttributeValue::List(_) => Err(ValidationError::EmptyInList(field.to_string())),
                other => Err(mismatch("a list", &other)),
            },
        }
    }
}

/// One gating condition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
    pub logical_operator: Option<LogicalOperator>,
}

impl Condition {
    pub fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
            logical_operator: None,
        }
    }

    /// Build from wire parts, checking the operand type
    pub fn parse(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: AttributeValue,
    ) -> Result<Self, ValidationError> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(ValidationError::EmptyField("condition field"));
        }
        let predicate = Predicate::compile(&field, operator, value)?;
        Ok(Self::new(field, predicate))
    }

    pub fn equals(field: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::new(field, Predicate::Equals(value.into()))
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<Decimal>) -> Self {
        Self::new(field, Predicate::GreaterThan(value.into()))
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<Decimal>) -> Self {
        Self::new(field, Predicate::LessThan(value.into()))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::new(field, Predicate::Contains(value.into()))
    }

    pub fn is_in<T: Into<AttributeValue>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(
            field,
            Predicate::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Join with the next condition using AND
    pub fn and(mut self) -> Self {
        self.logical_operator = Some(LogicalOperator::And);
        self
    }

    /// Join with the next condition using OR
    pub fn or(mut self) -> Self {
        self.logical_operator = Some(LogicalOperator::Or);
        self
    }

    pub fn operator(&self) -> ConditionOperator {
        self.predicate.operator()
    }

    /// Re-check a condition built in code through [`Condition::new`]
    pub fn validate(&self) -> Result<(), ValidationError> {
        Condition::parse(self.field.clone(), self.operator(), self.predicate.operand()).map(|_| ())
    }
}

/// Validate a condition list: every condition individually, and no
/// logical operator dangling off the last one.
pub fn validate_conditions(conditions: &[Condition]) -> Result<(), ValidationError> {
    for condition in conditions {
        condition.validate()?;
    }
    if let Some(last) = conditions.last() {
        if last.logical_operator.is_some() {
            return Err(ValidationError::DanglingLogicalOperator(last.field.clone()));
        }
    }
    Ok(())
}

/// Wire form of a condition
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: AttributeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl TryFrom<RawCondition> for Condition {
    type Error = ValidationError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let mut condition = Condition::parse(raw.field, raw.operator, raw.value)?;
        condition.logical_operator = raw.logical_operator;
        Ok(condition)
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        RawCondition {
            operator: condition.operator(),
            value: condition.predicate.operand(),
            field: condition.field,
            logical_operator: condition.logical_operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_typed_operands() {
        let c: Condition = serde_json::from_value(json!({
            "field": "amount",
            "operator": "greater_than",
            "value": 1000,
            "logicalOperator": "OR"
        }))
        .unwrap();
        assert_eq!(c.predicate, Predicate::GreaterThan(Decimal::from(1000)));
        assert_eq!(c.logical_operator, Some(LogicalOperator::Or));
    }

    #[test]
    fn rejects_comparison_against_text() {
        let err = serde_json::from_value::<Condition>(json!({
            "field": "amount",
            "operator": "less_than",
            "value": "lots"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("requires a number"));
    }

    #[test]
    fn in_requires_non_empty_list() {
        assert!(Condition::parse("currency", ConditionOperator::In, "usd".into()).is_err());
        assert!(Condition::parse(
            "currency",
            ConditionOperator::In,
            AttributeValue::List(vec![])
        )
        .is_err());
        assert!(Condition::parse("currency", ConditionOperator::In, vec!["usd"].into()).is_ok());
    }

    #[test]
    fn empty_field_rejected() {
        let err = Condition::parse(" ", ConditionOperator::Equals, true.into()).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyField(_)));
    }

    #[test]
    fn dangling_operator_rejected() {
        let conditions = vec![
            Condition::equals("department", "finance").and(),
            Condition::greater_than("amount", 10).or(),
        ];
        assert!(matches!(
            validate_conditions(&conditions),
            Err(ValidationError::DanglingLogicalOperator(_))
        ));
    }

    #[test]
    fn serializes_to_wire_form() {
        let c = Condition::is_in("currency", vec!["usd", "eur"]).and();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(
            json,
            json!({
                "field": "currency",
                "operator": "in",
                "value": ["usd", "eur"],
                "logicalOperator": "AND"
            })
        );
    }
}
