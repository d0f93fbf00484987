//! Target field schema: which raw columns are kept and how each parses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name → declared parsing type. Read-only after load.
pub type FieldSchema = BTreeMap<String, FieldType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Float,
    Int,
    Text,
}

/// One parsed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Text => "text",
        }
    }

    /// Parse a raw cell. Surrounding whitespace is ignored.
    /// Returns `None` when the cell does not fit the declared type.
    pub fn parse(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            Self::Float => raw.parse::<f64>().ok().map(Value::Float),
            Self::Int => raw.parse::<i64>().ok().map(Value::Int),
            Self::Text => Some(Value::Text(raw.to_string())),
        }
    }

    /// Padding value for this type.
    pub fn default_value(self) -> Value {
        match self {
            Self::Float => Value::Float(0.0),
            Self::Int => Value::Int(0),
            Self::Text => Value::Text(String::new()),
        }
    }
}

impl Value {
    /// Numeric view. Text cells count as 0.0.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Text(_) => 0.0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used when a cell is a grouping key.
    pub fn as_key(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parse_trims_and_rejects_text() {
        assert_eq!(FieldType::Float.parse(" 12.5 "), Some(Value::Float(12.5)));
        assert_eq!(FieldType::Int.parse("7"), Some(Value::Int(7)));
        assert_eq!(FieldType::Int.parse("7.5"), None);
        assert_eq!(FieldType::Float.parse("n/a"), None);
    }

    #[test]
    fn defaults_are_zero_or_empty() {
        assert_eq!(FieldType::Float.default_value(), Value::Float(0.0));
        assert_eq!(FieldType::Int.default_value(), Value::Int(0));
        assert_eq!(FieldType::Text.default_value(), Value::Text(String::new()));
    }

    #[test]
    fn integer_keys_render_without_decimals() {
        assert_eq!(Value::Int(1001).as_key(), "1001");
        assert_eq!(Value::Text("A-7".into()).as_key(), "A-7");
    }
}
