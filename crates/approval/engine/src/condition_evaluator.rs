//! Condition evaluator: decides whether gating conditions hold
//!
//! Evaluation is a pure function of the condition list and the attribute
//! snapshot. A missing attribute or a type mismatch makes that single
//! condition false; evaluation itself never fails.

use approval_types::{AttributeValue, Attributes, Condition, LogicalOperator, Predicate};

/// Evaluates condition lists against entity attributes
#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Fold the list left to right.
    ///
    /// The logical operator on condition `i` joins the running result with
    /// condition `i + 1`; a missing operator means AND. There is no
    /// precedence: `a OR b AND c` is `(a OR b) AND c`. An empty list holds.
    pub fn evaluate(&self, conditions: &[Condition], attributes: &Attributes) -> bool {
        let Some((first, rest)) = conditions.split_first() else {
            return true;
        };

        let mut result = self.matches(first, attributes);
        let mut join = first.logical_operator.unwrap_or(LogicalOperator::And);
        for condition in rest {
            result = match join {
                LogicalOperator::And => result && self.matches(condition, attributes),
                LogicalOperator::Or => result || self.matches(condition, attributes),
            };
            join = condition.logical_operator.unwrap_or(LogicalOperator::And);
        }

        tracing::trace!(conditions = conditions.len(), result, "conditions evaluated");
        result
    }

    /// Evaluate one condition in isolation
    pub fn matches(&self, condition: &Condition, attributes: &Attributes) -> bool {
        let Some(actual) = attributes.get(&condition.field) else {
            return false;
        };

        match &condition.predicate {
            Predicate::Equals(expected) => scalar_eq(actual, expected),
            Predicate::GreaterThan(bound) => actual.as_number().is_some_and(|n| n > *bound),
            Predicate::LessThan(bound) => actual.as_number().is_some_and(|n| n < *bound),
            Predicate::Contains(needle) => match (actual, needle) {
                (AttributeValue::Text(hay), AttributeValue::Text(needle)) => {
                    hay.contains(needle.as_str())
                }
                (AttributeValue::List(items), needle) => {
                    items.iter().any(|item| scalar_eq(item, needle))
                }
                _ => false,
            },
            Predicate::In(options) => options.iter().any(|option| scalar_eq(actual, option)),
        }
    }
}

/// Same-typed scalar equality. Numbers compare by value, so `1.50 == 1.5`.
fn scalar_eq(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
        (AttributeValue::Number(a), AttributeValue::Number(b)) => a == b,
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
        _ => false,
    }
}
