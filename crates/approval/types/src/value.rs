//! Strongly typed attribute values
//!
//! Entity attribute snapshots and condition operands share one value type.
//! On the wire they are plain JSON scalars and arrays; JSON numbers are read
//! into [`Decimal`] from their exact text (serde_json `arbitrary_precision`)
//! so monetary comparisons never go through floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Flattened attribute map of an entity, keyed by field name
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A typed attribute or operand value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum AttributeValue {
    Text(String),
    Number(Decimal),
    Bool(bool),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, AttributeValue::List(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Text(_) => "text",
            AttributeValue::Number(_) => "number",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::List(_) => "list",
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{:?}", s),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl TryFrom<serde_json::Value> for AttributeValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(AttributeValue::Text(s)),
            serde_json::Value::Bool(b) => Ok(AttributeValue::Bool(b)),
            serde_json::Value::Number(n) => {
                let repr = n.as_str();
                Decimal::from_str(repr)
                    .or_else(|_| Decimal::from_scientific(repr))
                    .map(AttributeValue::Number)
                    .map_err(|e| format!("number '{}' is not representable: {}", repr, e))
            }
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(AttributeValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(AttributeValue::List),
            serde_json::Value::Null => Err("null is not a valid attribute value".to_string()),
            serde_json::Value::Object(_) => {
                Err("nested objects are not valid attribute values; flatten the field".to_string())
            }
        }
    }
}

impl From<AttributeValue> for serde_json::Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Text(s) => serde_json::Value::String(s),
            AttributeValue::Bool(b) => serde_json::Value::Bool(b),
            AttributeValue::Number(n) => {
                let repr = n.normalize().to_string();
                serde_json::Number::from_str(&repr)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::String(repr))
            }
            AttributeValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<Decimal> for AttributeValue {
    fn from(value: Decimal) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(Decimal::from(value))
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(Decimal::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_json_numbers_as_decimals() {
        let v: AttributeValue = serde_json::from_value(json!(1250.75)).unwrap();
        assert_eq!(v.as_number(), Some(Decimal::from_str("1250.75").unwrap()));

        let v: AttributeValue = serde_json::from_value(json!(500)).unwrap();
        assert_eq!(v, AttributeValue::from(500i64));
    }

    #[test]
    fn long_decimals_survive_json_text() {
        for repr in ["999999999999.9999", "1234567890123456789.01", "0.0000000000000001"] {
            let v = AttributeValue::Number(Decimal::from_str(repr).unwrap());
            let text = serde_json::to_string(&v).unwrap();
            assert_eq!(text, repr);
            let back: AttributeValue = serde_json::from_str(&text).unwrap();
            assert_eq!(back, v);

            let via_value: AttributeValue =
                serde_json::from_value(serde_json::to_value(&v).unwrap()).unwrap();
            assert_eq!(via_value, v);
        }
    }

    #[test]
    fn numeric_strings_stay_text() {
        let v: AttributeValue = serde_json::from_value(json!("500")).unwrap();
        assert_eq!(v.as_text(), Some("500"));
    }

    #[test]
    fn rejects_null_and_objects() {
        assert!(serde_json::from_value::<AttributeValue>(json!(null)).is_err());
        assert!(serde_json::from_value::<AttributeValue>(json!({"a": 1})).is_err());
    }

    #[test]
    fn lists_round_trip_through_json() {
        let v = AttributeValue::from(vec!["usd", "eur"]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, json!(["usd", "eur"]));
        let back: AttributeValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn decimal_equality_ignores_scale() {
        let a = AttributeValue::Number(Decimal::from_str("10.0").unwrap());
        let b = AttributeValue::from(10i64);
        assert_eq!(a, b);
    }
}
