//! Structural introspection of GUI objects
//!
//! Produces JSON-safe summaries of arbitrary object graphs for remote display.
//! Neither function dereferences opaque values, and both tolerate cycles.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::object::{ObjectKey, ObjectRef, Prop};

/// Key carried by every placeholder that replaces a value we refused to serialize
pub const WARNING_MARKER: &str = "__labwire_warning__";

/// Summarize the members of `value`
///
/// Walks `depth` levels of the prototype chain (1 = own members only). Scalar
/// members are reported with their literal value; every other member is
/// collected by name under a key naming its type (`"function"`, `"array"`, a
/// class name, ...).
pub fn list_properties(value: &Prop, depth: usize, omit_hidden: bool) -> Value {
    let members = match value {
        Prop::Object(obj) => object_members(obj, depth.max(1)),
        Prop::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Prop::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        scalar => return safe_json(scalar),
    };

    let mut out = Map::new();
    let mut buckets: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (name, member) in members {
        if omit_hidden && name.starts_with('_') {
            continue;
        }
        if member.is_scalar() {
            out.insert(name, safe_json(&member));
        } else {
            buckets
                .entry(member.type_name().to_string())
                .or_default()
                .push(Value::String(name));
        }
    }
    for (type_name, names) in buckets {
        out.insert(type_name, Value::Array(names));
    }
    Value::Object(out)
}

fn object_members(obj: &ObjectRef, depth: usize) -> Vec<(String, Prop)> {
    let mut seen = HashSet::new();
    let mut members = Vec::new();
    let mut level = Some(obj.clone());
    for _ in 0..depth {
        let Some(current) = level else { break };
        for (name, value) in current.entries() {
            if seen.insert(name.clone()) {
                members.push((name, value));
            }
        }
        level = current.prototype().cloned();
    }
    members
}

/// Serialize any value to a JSON string without failing
pub fn safe_stringify(value: &Prop) -> String {
    safe_json(value).to_string()
}

/// Convert any value to JSON, replacing cycles and opaque values with markers
pub fn safe_json(value: &Prop) -> Value {
    let mut ancestors = Vec::new();
    to_json(value, &mut ancestors)
}

fn to_json(value: &Prop, ancestors: &mut Vec<ObjectKey>) -> Value {
    match value {
        Prop::Null | Prop::Method(_) => Value::Null,
        Prop::Bool(b) => Value::Bool(*b),
        Prop::Number(n) => Value::Number(n.clone()),
        Prop::String(s) => Value::String(s.clone()),
        Prop::List(items) => Value::Array(items.iter().map(|v| to_json(v, ancestors)).collect()),
        Prop::Map(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if !matches!(v, Prop::Method(_)) {
                    out.insert(k.clone(), to_json(v, ancestors));
                }
            }
            Value::Object(out)
        }
        Prop::Object(obj) => {
            let key = ObjectKey::of(obj);
            if ancestors.contains(&key) {
                let mut marker = Map::new();
                marker.insert(
                    WARNING_MARKER.to_string(),
                    Value::String(format!("circular reference to {}", obj.class_name())),
                );
                marker.insert("properties".to_string(), list_properties(value, 1, false));
                return Value::Object(marker);
            }

            ancestors.push(key);
            let mut out = Map::new();
            for (k, v) in obj.entries() {
                if !matches!(v, Prop::Method(_)) {
                    out.insert(k, to_json(&v, ancestors));
                }
            }
            ancestors.pop();
            Value::Object(out)
        }
        Prop::Opaque(name) => {
            let mut marker = Map::new();
            marker.insert(
                WARNING_MARKER.to_string(),
                Value::String(format!("unserializable {}", name)),
            );
            Value::Object(marker)
        }
    }
}
