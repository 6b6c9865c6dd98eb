//! Conversion between live values and their JSON wire form
//!
//! Live objects never cross the channel inline; they travel as `{"cid": ...}`
//! references minted through the registry.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::BridgeError;
use crate::object::Prop;
use crate::registry::ObjectRegistry;

/// Build a `{cid}` reference
pub fn cid_ref(cid: impl Into<String>) -> Value {
    let mut map = Map::new();
    map.insert("cid".to_string(), Value::String(cid.into()));
    Value::Object(map)
}

/// Extract the id from a `{cid}` reference
pub fn as_cid_ref(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("cid").and_then(Value::as_str),
        _ => None,
    }
}

/// Convert a value to JSON, registering any live object it contains
///
/// Methods are dropped from maps and become `null` in lists; opaque values
/// are replaced by their type name.
pub fn to_wire(value: &Prop, registry: &Arc<ObjectRegistry>) -> Result<Value, BridgeError> {
    Ok(match value {
        Prop::Null | Prop::Method(_) => Value::Null,
        Prop::Bool(b) => Value::Bool(*b),
        Prop::Number(n) => Value::Number(n.clone()),
        Prop::String(s) => Value::String(s.clone()),
        Prop::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_wire(item, registry))
                .collect::<Result<_, _>>()?,
        ),
        Prop::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                if !matches!(item, Prop::Method(_)) {
                    out.insert(key.clone(), to_wire(item, registry)?);
                }
            }
            Value::Object(out)
        }
        Prop::Object(object) => match registry.get_or_assign_id(object, true)? {
            Some(cid) => cid_ref(cid),
            None => Value::Null,
        },
        Prop::Opaque(name) => Value::String(name.clone()),
    })
}

/// Convert JSON to a value, turning known `{cid}` references into live objects
pub fn from_wire(value: Value, registry: &ObjectRegistry) -> Prop {
    if let Some(object) = as_cid_ref(&value).and_then(|cid| registry.lookup(cid)) {
        return Prop::Object(object);
    }
    match value {
        Value::Array(items) => Prop::List(
            items
                .into_iter()
                .map(|item| from_wire(item, registry))
                .collect(),
        ),
        Value::Object(map) => Prop::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_wire(v, registry)))
                .collect(),
        ),
        other => Prop::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{GuiObject, Method};
    use serde_json::json;

    #[test]
    fn test_objects_become_references() {
        let registry = Arc::new(ObjectRegistry::new());
        let panel = GuiObject::builder("Panel").prop("title", "x").build();
        let value = Prop::map([
            ("panel", Prop::Object(panel.clone())),
            ("n", Prop::from(1i64)),
            ("cb", Prop::Method(Method::sync(|_, _| Ok(Prop::Null)))),
        ]);

        let wire = to_wire(&value, &registry).unwrap();
        let cid = registry.id_of(&panel).unwrap();
        assert_eq!(wire, json!({"panel": {"cid": cid}, "n": 1}));
    }

    #[test]
    fn test_from_wire_resolves_known_ids() {
        let registry = Arc::new(ObjectRegistry::new());
        let panel = GuiObject::empty("Panel");
        registry.register("p1", &panel).unwrap();

        let prop = from_wire(json!([{"cid": "p1"}, {"cid": "unknown"}]), &registry);
        let items = prop.as_list().unwrap();
        assert_eq!(items[0], Prop::Object(panel));
        assert_eq!(items[1], Prop::from(json!({"cid": "unknown"})));
    }

    #[test]
    fn test_cid_ref_shape() {
        assert_eq!(as_cid_ref(&cid_ref("a")), Some("a"));
        assert_eq!(as_cid_ref(&json!({"cid": "a", "x": 1})), None);
    }
}
