//! Generic structured value shared by suite conditions and decoded payloads.
//!
//! Rule conditions come from YAML while message bodies usually arrive as
//! JSON, so both are funnelled into one [`Value`] type. Comparisons between
//! them go through [`Value::canonical_string`], never through typed equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A decoded payload or configured literal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// An empty mapping, the decoded form of an empty body.
    pub fn empty_mapping() -> Self {
        Value::Mapping(BTreeMap::new())
    }

    /// Look up a field of a mapping. Non-mapping values have no fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Mapping(map) => map.get(field),
            _ => None,
        }
    }

    /// Render the value the way the rule comparator sees it.
    ///
    /// Integral floats print as integers so that `1`, `1.0` and `"1"` all
    /// compare equal.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&canonical_float(*f)),
            Value::String(s) => out.push_str(s),
            Value::Sequence(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Value::Mapping(map) => {
                out.push('{');
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    item.write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

fn canonical_float(f: f64) -> String {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_canonical_strings() {
        assert_eq!(Value::Null.canonical_string(), "null");
        assert_eq!(Value::Bool(true).canonical_string(), "true");
        assert_eq!(Value::Integer(-7).canonical_string(), "-7");
        assert_eq!(Value::Float(1.0).canonical_string(), "1");
        assert_eq!(Value::Float(1.5).canonical_string(), "1.5");
        assert_eq!(Value::from("1").canonical_string(), "1");
    }

    #[test]
    fn test_non_finite_float_is_total() {
        assert_eq!(Value::Float(f64::NAN).canonical_string(), "NaN");
        assert_eq!(Value::Float(f64::INFINITY).canonical_string(), "inf");
    }

    #[test]
    fn test_nested_canonical_string() {
        let value: Value = serde_json::from_str(r#"{"b": [1, "x"], "a": {"c": null}}"#).unwrap();
        assert_eq!(value.canonical_string(), "{a: {c: null}, b: [1, x]}");
    }

    #[test]
    fn test_json_and_yaml_numbers_agree() {
        let from_json: Value = serde_json::from_str("1").unwrap();
        let from_yaml: Value = serde_yaml::from_str("1.0").unwrap();
        assert_eq!(from_json, Value::Integer(1));
        assert_eq!(from_json.canonical_string(), from_yaml.canonical_string());
    }

    #[test]
    fn test_get_only_on_mappings() {
        let value: Value = serde_json::from_str(r#"{"type": "a"}"#).unwrap();
        assert_eq!(value.get("type"), Some(&Value::from("a")));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::from("type").get("type"), None);
    }
}
