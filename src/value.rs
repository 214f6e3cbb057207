//! Schema-free value type for problem inputs, metadata, and tool arguments.
//!
//! Problem inputs and RPC tool arguments are shape-free by contract (see
//! spec §9, "dynamic `interface{}` input maps"). Rather than threading
//! `serde_json::Value` through every signature, we model the sum type
//! explicitly and resolve field expectations at executor boundaries with
//! typed accessors, so a caller reading `Executor::execute` can see
//! exactly what shapes are legal without consulting JSON elsewhere.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A dynamically-typed value: string, number, bool, list, or nested map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Null,
}

/// A free-form map of named dynamic values (problem `input`, tool
/// `arguments`, session/trajectory `metadata`).
pub type ValueMap = BTreeMap<String, Value>;

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Render a best-effort display string, used when projecting a value
    /// map into free text (e.g. embedding text projection).
    pub fn display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::List(items) => items
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| format!("{k}={}", v.display()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_accessor() {
        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_f64(), None);
    }

    #[test]
    fn number_parses_from_string() {
        let v = Value::String("3.5".into());
        assert_eq!(v.as_f64(), Some(3.5));
    }

    #[test]
    fn map_display_is_sorted_and_joined() {
        let mut m = ValueMap::new();
        m.insert("a".into(), Value::from("1"));
        m.insert("b".into(), Value::from("2"));
        let v = Value::Map(m);
        assert_eq!(v.display(), "a=1, b=2");
    }
}
