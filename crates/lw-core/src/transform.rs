//! Transform pipeline
//!
//! A transform directive travels with each request. The side that performs
//! the operation applies it to the raw result to produce the JSON that
//! crosses the channel; the side that asked then resolves that JSON back
//! into local values.
//!
//! Directive forms accepted on the wire:
//!
//! - `"raw"`, `"null"`, `"auto"`, `"connection"`, `"object"`
//! - `{"transform": "connection", "cid": "..."}`
//! - `{"transform": "advanced", "mappings": {"field": <directive>, ...}}`
//! - `{"transform": "function", "code": "<registered name>"}`

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::access;
use crate::error::BridgeError;
use crate::introspect;
use crate::object::Prop;
use crate::registry::ObjectRegistry;
use crate::wire::{self, cid_ref};

/// Post-processing directive applied to an operation result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Transform {
    /// Return the value as JSON, live objects as references
    Raw,
    /// Discard the value
    Null,
    /// References for disposables, lists materialized, anything else as-is
    #[default]
    Auto,
    /// Force a reference, optionally under a caller-chosen id
    Connection { cid: Option<String> },
    /// Apply a nested directive to each named field
    Advanced(BTreeMap<String, Transform>),
    /// Run a registered post-processor
    Function { name: String },
    /// Plain-object coercion
    Object,
}

impl Transform {
    /// Parse a wire directive; absent or `null` means [`Transform::Auto`]
    pub fn from_value(value: Option<&Value>) -> Result<Self, BridgeError> {
        let invalid = |v: &Value| BridgeError::InvalidTransform(v.to_string());

        match value {
            None | Some(Value::Null) => Ok(Transform::Auto),
            Some(Value::String(name)) => Self::from_name(name)
                .ok_or_else(|| BridgeError::InvalidTransform(name.clone())),
            Some(v) if v.is_object() => {
                let map = v.as_object().ok_or_else(|| invalid(v))?;
                let name = map
                    .get("transform")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(v))?;
                match name {
                    "connection" => Ok(Transform::Connection {
                        cid: map.get("cid").and_then(Value::as_str).map(str::to_string),
                    }),
                    "advanced" => {
                        let mappings = map
                            .get("mappings")
                            .and_then(Value::as_object)
                            .ok_or_else(|| invalid(v))?;
                        let mut fields = BTreeMap::new();
                        for (field, nested) in mappings {
                            fields.insert(field.clone(), Self::from_value(Some(nested))?);
                        }
                        Ok(Transform::Advanced(fields))
                    }
                    "function" => {
                        let code = map
                            .get("code")
                            .and_then(Value::as_str)
                            .ok_or_else(|| invalid(v))?;
                        Ok(Transform::Function {
                            name: code.to_string(),
                        })
                    }
                    other => Self::from_name(other).ok_or_else(|| invalid(v)),
                }
            }
            Some(other) => Err(invalid(other)),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "raw" => Some(Transform::Raw),
            "null" => Some(Transform::Null),
            "auto" => Some(Transform::Auto),
            "connection" => Some(Transform::Connection { cid: None }),
            "object" => Some(Transform::Object),
            _ => None,
        }
    }

    /// Wire form of the directive
    pub fn to_value(&self) -> Value {
        match self {
            Transform::Raw => Value::from("raw"),
            Transform::Null => Value::from("null"),
            Transform::Auto => Value::from("auto"),
            Transform::Object => Value::from("object"),
            Transform::Connection { cid: None } => Value::from("connection"),
            Transform::Connection { cid: Some(cid) } => {
                let mut map = Map::new();
                map.insert("transform".into(), Value::from("connection"));
                map.insert("cid".into(), Value::from(cid.clone()));
                Value::Object(map)
            }
            Transform::Advanced(fields) => {
                let mappings: Map<String, Value> = fields
                    .iter()
                    .map(|(k, t)| (k.clone(), t.to_value()))
                    .collect();
                let mut map = Map::new();
                map.insert("transform".into(), Value::from("advanced"));
                map.insert("mappings".into(), Value::Object(mappings));
                Value::Object(map)
            }
            Transform::Function { name } => {
                let mut map = Map::new();
                map.insert("transform".into(), Value::from("function"));
                map.insert("code".into(), Value::from(name.clone()));
                Value::Object(map)
            }
        }
    }

    /// Turn a raw result into the JSON sent back to the caller
    pub fn apply(&self, value: Prop, ctx: TransformContext) -> BoxFuture<'static, Result<Value, BridgeError>> {
        let transform = self.clone();
        Box::pin(async move {
            match transform {
                Transform::Raw => wire::to_wire(&value, &ctx.registry),
                Transform::Null => Ok(Value::Null),
                Transform::Auto => auto(&value, &ctx.registry),
                Transform::Connection { cid } => connection(&value, cid.as_deref(), &ctx.registry),
                Transform::Advanced(fields) => {
                    let mut out = Map::new();
                    for (field, nested) in fields {
                        let member = access::get(&value, &field, false)?;
                        out.insert(field, nested.apply(member, ctx.clone()).await?);
                    }
                    Ok(Value::Object(out))
                }
                Transform::Function { name } => {
                    let function = ctx
                        .functions
                        .get(&name)
                        .ok_or_else(|| BridgeError::InvalidTransform(format!("unknown function '{}'", name)))?;
                    let result = function(value).await?;
                    wire::to_wire(&result, &ctx.registry)
                }
                Transform::Object => Ok(introspect::safe_json(&value)),
            }
        })
    }

    /// Turn a received result into a local value
    ///
    /// `raw` results are returned verbatim; other directives resolve `{cid}`
    /// references known to the local registry into live objects.
    pub fn resolve(&self, value: Value, registry: &ObjectRegistry) -> Prop {
        match self {
            Transform::Raw => Prop::from(value),
            Transform::Null => Prop::Null,
            Transform::Advanced(fields) => match value {
                Value::Object(map) => Prop::Map(
                    map.into_iter()
                        .map(|(k, v)| {
                            let resolved = match fields.get(&k) {
                                Some(nested) => nested.resolve(v, registry),
                                None => wire::from_wire(v, registry),
                            };
                            (k, resolved)
                        })
                        .collect(),
                ),
                other => wire::from_wire(other, registry),
            },
            _ => wire::from_wire(value, registry),
        }
    }
}

fn is_disposable(value: &Prop, registry: &ObjectRegistry) -> bool {
    match value {
        Prop::Object(object) => registry.signal_of(object).is_some(),
        _ => false,
    }
}

fn auto(value: &Prop, registry: &Arc<ObjectRegistry>) -> Result<Value, BridgeError> {
    match value {
        Prop::Object(_) if is_disposable(value, registry) => connection(value, None, registry),
        Prop::Object(_) => Ok(introspect::safe_json(value)),
        Prop::List(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| auto(item, registry))
                .collect::<Result<_, _>>()?,
        )),
        Prop::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                if !matches!(item, Prop::Method(_)) {
                    out.insert(key.clone(), auto(item, registry)?);
                }
            }
            Ok(Value::Object(out))
        }
        other => wire::to_wire(other, registry),
    }
}

fn connection(value: &Prop, cid: Option<&str>, registry: &Arc<ObjectRegistry>) -> Result<Value, BridgeError> {
    let object = value.as_object().ok_or_else(|| {
        BridgeError::Registration(format!(
            "connection transform needs an object, got {}",
            value.type_name()
        ))
    })?;

    let cid = match cid {
        Some(cid) => {
            registry.register(cid, object)?;
            cid.to_string()
        }
        None => registry
            .get_or_assign_id(object, true)?
            .ok_or_else(|| BridgeError::Registration(object.class_name().to_string()))?,
    };
    Ok(cid_ref(cid))
}

/// Registered post-processor for `function` transforms
pub type PostProcessor = Arc<dyn Fn(Prop) -> BoxFuture<'static, Result<Prop, BridgeError>> + Send + Sync>;

/// Named post-processors callers can select with a `function` transform
#[derive(Default)]
pub struct FunctionTable {
    functions: DashMap<String, PostProcessor>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a post-processor, replacing any previous one with that name
    pub fn register<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Prop) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Prop, BridgeError>> + Send + 'static,
    {
        let processor: PostProcessor = Arc::new(move |value| Box::pin(f(value)));
        self.functions.insert(name.into(), processor);
    }

    pub fn get(&self, name: &str) -> Option<PostProcessor> {
        self.functions.get(name).map(|f| f.clone())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

/// Shared state a transform needs while it runs
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub registry: Arc<ObjectRegistry>,
    pub functions: Arc<FunctionTable>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::GuiObject;
    use serde_json::json;

    fn ctx() -> TransformContext {
        TransformContext {
            registry: Arc::new(ObjectRegistry::new()),
            functions: Arc::new(FunctionTable::new()),
        }
    }

    #[test]
    fn test_parse_directives() {
        assert_eq!(Transform::from_value(None).unwrap(), Transform::Auto);
        assert_eq!(
            Transform::from_value(Some(&json!("raw"))).unwrap(),
            Transform::Raw
        );
        assert_eq!(
            Transform::from_value(Some(&json!({"transform": "connection", "cid": "x"}))).unwrap(),
            Transform::Connection {
                cid: Some("x".into())
            }
        );

        let advanced = json!({"transform": "advanced", "mappings": {"id": "raw", "w": "connection"}});
        let parsed = Transform::from_value(Some(&advanced)).unwrap();
        assert_eq!(parsed.to_value(), advanced);
    }

    #[test]
    fn test_invalid_directive_names_value() {
        match Transform::from_value(Some(&json!("bogus"))) {
            Err(BridgeError::InvalidTransform(v)) => assert_eq!(v, "bogus"),
            other => panic!("Wrong result: {:?}", other),
        }
        assert!(Transform::from_value(Some(&json!(42))).is_err());
        assert!(Transform::from_value(Some(&json!({"transform": "advanced"}))).is_err());
    }

    #[tokio::test]
    async fn test_raw_is_identity_for_json() {
        let value = json!({"a": [1, 2.5, "x", null, {"b": false}]});
        let out = Transform::Raw
            .apply(Prop::from(value.clone()), ctx())
            .await
            .unwrap();
        assert_eq!(out, value);
        assert_eq!(
            Transform::Raw.resolve(out, &ObjectRegistry::new()),
            Prop::from(value)
        );
    }

    #[tokio::test]
    async fn test_auto_wraps_disposables_only() {
        let ctx = ctx();
        let widget = GuiObject::builder("Widget").disposable().build();
        let plain = GuiObject::builder("Options").prop("x", 1i64).build();

        let out = Transform::Auto
            .apply(Prop::Object(widget.clone()), ctx.clone())
            .await
            .unwrap();
        let cid = ctx.registry.id_of(&widget).unwrap();
        assert_eq!(out, json!({"cid": cid}));

        let out = Transform::Auto
            .apply(Prop::Object(plain.clone()), ctx.clone())
            .await
            .unwrap();
        assert_eq!(out, json!({"x": 1}));
        assert!(ctx.registry.id_of(&plain).is_none());

        let out = Transform::Auto.apply(Prop::from(2i64), ctx).await.unwrap();
        assert_eq!(out, json!(2));
    }

    #[tokio::test]
    async fn test_connection_with_explicit_cid() {
        let ctx = ctx();
        let obj = GuiObject::empty("Thing");
        let t = Transform::Connection {
            cid: Some("mine".into()),
        };
        let out = t.apply(Prop::Object(obj.clone()), ctx.clone()).await.unwrap();
        assert_eq!(out, json!({"cid": "mine"}));
        assert!(Arc::ptr_eq(&ctx.registry.lookup("mine").unwrap(), &obj));

        assert!(t.apply(Prop::from(1i64), ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_advanced_per_field() {
        let ctx = ctx();
        let widget = GuiObject::builder("Widget")
            .prop("id", "w1")
            .prop("title", Prop::map([("label", "Hello")]))
            .build();
        let t = Transform::from_value(Some(&json!({
            "transform": "advanced",
            "mappings": {"id": "raw", "title.label": "raw", "missing": "null"}
        })));
        // Missing fields are an error for advanced transforms
        assert!(t
            .clone()
            .unwrap()
            .apply(Prop::Object(widget.clone()), ctx.clone())
            .await
            .is_err());

        let t = Transform::from_value(Some(&json!({
            "transform": "advanced",
            "mappings": {"id": "raw", "title.label": "raw"}
        })))
        .unwrap();
        let out = t.apply(Prop::Object(widget), ctx).await.unwrap();
        assert_eq!(out, json!({"id": "w1", "title.label": "Hello"}));
    }

    #[tokio::test]
    async fn test_function_transform() {
        let ctx = ctx();
        ctx.functions.register("len", |value: Prop| async move {
            let n = value.as_str().map(|s| s.len()).unwrap_or(0);
            Ok(Prop::from(n as u64))
        });

        let t = Transform::Function { name: "len".into() };
        assert_eq!(t.apply(Prop::from("abcd"), ctx.clone()).await.unwrap(), json!(4));

        let missing = Transform::Function {
            name: "nope".into(),
        };
        assert!(matches!(
            missing.apply(Prop::Null, ctx).await,
            Err(BridgeError::InvalidTransform(_))
        ));
    }
}
