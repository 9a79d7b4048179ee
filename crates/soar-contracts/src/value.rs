//! Recursive tagged value tree used for event data, execution variables,
//! step params and checkpoint snapshots.
//!
//! Distinct from `serde_json::Value` on purpose: callers that need to know
//! whether a path is absent versus present-but-null use [`Value::get_path`],
//! which returns `Option<&Value>` rather than folding "missing" into `Null`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON-compatible value with explicit "missing" semantics at the path
/// level (see [`Value::get_path`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Resolve a dotted path (`"steps.s1.output.score"`) against this value.
    ///
    /// Each segment indexes into an object by key or, if the segment parses
    /// as a non-negative integer, into an array by index. Returns `None` as
    /// soon as a segment can't be resolved — this is the "missing" case
    /// templates render as an empty string and predicates treat as
    /// not-equal.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a dotted path, creating intermediate objects as needed.
    /// Array segments are not created implicitly; setting through an
    /// existing array index in bounds is supported, extension is not.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        self.set_path_segments(&segments, value);
    }

    fn set_path_segments(&mut self, segments: &[&str], value: Value) {
        let Some((head, rest)) = segments.split_first() else {
            *self = value;
            return;
        };

        if !matches!(self, Value::Object(_)) {
            *self = Value::object();
        }
        let Value::Object(map) = self else { unreachable!() };

        if rest.is_empty() {
            map.insert(head.to_string(), value);
        } else {
            let entry = map.entry(head.to_string()).or_insert_with(Value::object);
            entry.set_path_segments(rest, value);
        }
    }

    /// Shallow-merge `other`'s top-level object keys into `self`, overwriting
    /// on conflict. Used when an action result's `data` is merged into
    /// execution variables (spec §4.4 step 7).
    pub fn merge_object(&mut self, other: &Value) {
        if let (Value::Object(target), Value::Object(source)) = (&mut *self, other) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
    }

    /// Deep clone — checkpoint snapshots must never alias the live
    /// `variables` tree (spec §3 invariant, §9 redesign note).
    pub fn deep_clone(&self) -> Value {
        self.clone()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Array(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(a) => serde_json::Value::Array(a.into_iter().map(Into::into).collect()),
            Value::Object(o) => {
                serde_json::Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        serde_json::json!({
            "severity": "high",
            "entityId": 7,
            "steps": {
                "s1": { "success": true, "output": { "score": 9 } }
            },
            "tags": ["ransomware", "lateral-movement"]
        })
        .into()
    }

    #[test]
    fn resolves_nested_object_path() {
        let v = sample();
        assert_eq!(v.get_path("steps.s1.success").and_then(Value::as_bool), Some(true));
        assert_eq!(
            v.get_path("steps.s1.output.score").and_then(Value::as_f64),
            Some(9.0)
        );
    }

    #[test]
    fn resolves_array_index() {
        let v = sample();
        assert_eq!(v.get_path("tags.0").and_then(Value::as_str), Some("ransomware"));
    }

    #[test]
    fn missing_path_is_none_not_null() {
        let v = sample();
        assert!(v.get_path("nope.nested").is_none());
        assert!(v.get_path("steps.s2.success").is_none());
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut v = Value::object();
        v.set_path("steps.s1.output", Value::from("done"));
        assert_eq!(v.get_path("steps.s1.output").and_then(Value::as_str), Some("done"));
    }

    #[test]
    fn merge_object_overwrites_top_level_keys() {
        let mut v: Value = serde_json::json!({"a": 1, "b": 2}).into();
        let other: Value = serde_json::json!({"b": 3, "c": 4}).into();
        v.merge_object(&other);
        assert_eq!(v.get_path("a").and_then(Value::as_f64), Some(1.0));
        assert_eq!(v.get_path("b").and_then(Value::as_f64), Some(3.0));
        assert_eq!(v.get_path("c").and_then(Value::as_f64), Some(4.0));
    }

    #[test]
    fn deep_clone_does_not_alias() {
        let mut original: Value = serde_json::json!({"x": 1}).into();
        let snapshot = original.deep_clone();
        original.set_path("x", Value::from(2.0));
        assert_eq!(snapshot.get_path("x").and_then(Value::as_f64), Some(1.0));
        assert_eq!(original.get_path("x").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn display_renders_scalars_plainly() {
        assert_eq!(Value::from("high").to_string(), "high");
        assert_eq!(Value::from(7i64).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "");
    }
}
