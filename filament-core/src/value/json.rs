//! Plain-data bridge.
//!
//! Callers usually have an initial data graph in hand as plain JSON.
//! This module converts a `serde_json::Value` tree into targets ready to
//! be wrapped, and snapshots a target tree back out. Snapshots read the
//! raw storage directly and never track.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Number};

use super::{Key, Raw, Target, TargetId, Value};

impl Raw {
    /// Convert a JSON container into backing storage. Objects become
    /// records, arrays become lists. Returns `None` for scalars, which
    /// have no target form of their own.
    pub fn from_json(json: &serde_json::Value) -> Option<Raw> {
        match json {
            serde_json::Value::Object(map) => Some(Raw::Record(record_from_json(map))),
            serde_json::Value::Array(items) => Some(Raw::List(
                items.iter().map(Value::from_json).collect(),
            )),
            _ => None,
        }
    }
}

fn record_from_json(map: &Map<String, serde_json::Value>) -> IndexMap<Key, Value> {
    map.iter()
        .map(|(k, v)| (Key::Str(k.clone()), Value::from_json(v)))
        .collect()
}

impl Value {
    /// Convert a JSON value. Containers become fresh targets.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            container => Raw::from_json(container)
                .map(|raw| Value::Target(Target::new(raw)))
                .unwrap_or(Value::Null),
        }
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Target(t) => t.to_json_inner(seen),
            Value::Ref(r) => r.raw().to_json_inner(seen),
        }
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else if let Some(f) = n.as_f64() {
        // u64 beyond i64::MAX lands here and saturates into float space.
        Value::Float(f)
    } else {
        Value::Null
    }
}

impl Target {
    /// Snapshot the target tree as JSON. Untracked; cycles collapse to
    /// `null` at the second visit.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        if !seen.insert(self.id()) {
            return serde_json::Value::Null;
        }
        let out = match &*self.read() {
            Raw::Record(m) | Raw::KeyValueMap(m) => {
                let mut obj = Map::new();
                for (k, v) in m {
                    obj.insert(k.to_string(), v.to_json_inner(seen));
                }
                serde_json::Value::Object(obj)
            }
            Raw::List(items) => serde_json::Value::Array(
                items.iter().map(|v| v.to_json_inner(seen)).collect(),
            ),
            Raw::KeySet(keys) => serde_json::Value::Array(
                keys.iter()
                    .map(|k| serde_json::Value::String(k.to_string()))
                    .collect(),
            ),
        };
        seen.remove(&self.id());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let doc = json!({
            "name": "ada",
            "age": 36,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": { "ok": true, "none": null }
        });

        let raw = Raw::from_json(&doc).expect("object converts");
        let target = Target::new(raw);
        assert_eq!(target.to_json(), doc);
    }

    #[test]
    fn scalars_have_no_target_form() {
        assert!(Raw::from_json(&json!(1)).is_none());
        assert!(Raw::from_json(&json!("x")).is_none());
        assert!(Raw::from_json(&json!(null)).is_none());
    }

    #[test]
    fn nested_containers_become_distinct_targets() {
        let raw = Raw::from_json(&json!({ "inner": {} })).unwrap();
        let outer = Target::new(raw);
        let inner = match &*outer.read() {
            Raw::Record(m) => m[&Key::from("inner")].raw_target().unwrap(),
            _ => unreachable!(),
        };
        assert_ne!(outer.id(), inner.id());
    }

    #[test]
    fn nan_snapshots_as_null() {
        let target = Target::new(Raw::list_from([Value::Float(f64::NAN)]));
        assert_eq!(target.to_json(), json!([null]));
    }
}
