//! Dynamic property values

use futures::future::BoxFuture;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::gui::ObjectRef;
use crate::error::BridgeError;

/// Future returned by a [`Method`] call
pub type MethodFuture = BoxFuture<'static, Result<Prop, BridgeError>>;

type MethodFn = dyn Fn(Prop, Vec<Prop>) -> MethodFuture + Send + Sync;

/// An async callable bound at call time to its owner (`this`)
#[derive(Clone)]
pub struct Method(Arc<MethodFn>);

impl Method {
    /// Wrap an async function
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Prop, Vec<Prop>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Prop, BridgeError>> + Send + 'static,
    {
        Self(Arc::new(move |this, args| Box::pin(f(this, args))))
    }

    /// Wrap a synchronous function
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Prop, Vec<Prop>) -> Result<Prop, BridgeError> + Send + Sync + 'static,
    {
        Self(Arc::new(move |this, args| {
            Box::pin(futures::future::ready(f(this, args)))
        }))
    }

    /// Invoke with `this` bound to the owner
    pub fn call(&self, this: Prop, args: Vec<Prop>) -> MethodFuture {
        (self.0)(this, args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Method) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method")
    }
}

/// A GUI-side value
#[derive(Clone, Default)]
pub enum Prop {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Prop>),
    Map(BTreeMap<String, Prop>),
    /// A live object with identity
    Object(ObjectRef),
    Method(Method),
    /// A value that cannot be dereferenced remotely, named by its type
    Opaque(String),
}

impl Prop {
    /// Runtime type name used by the introspector's buckets
    pub fn type_name(&self) -> &str {
        match self {
            Prop::Null => "null",
            Prop::Bool(_) => "boolean",
            Prop::Number(_) => "number",
            Prop::String(_) => "string",
            Prop::List(_) => "array",
            Prop::Map(_) => "object",
            Prop::Object(obj) => obj.class_name(),
            Prop::Method(_) => "function",
            Prop::Opaque(name) => name,
        }
    }

    /// Null, booleans, numbers and strings
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Prop::Null | Prop::Bool(_) | Prop::Number(_) | Prop::String(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Prop::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Prop::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Prop::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Prop::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Prop::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Prop::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Prop]> {
        match self {
            Prop::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Prop::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Read one member of a map or object
    pub fn field(&self, name: &str) -> Option<Prop> {
        match self {
            Prop::Map(map) => map.get(name).cloned(),
            Prop::Object(obj) => obj.get(name),
            _ => None,
        }
    }

    /// Read a member that must be present, treating `null` as absent
    pub fn require(&self, name: &str) -> Result<Prop, BridgeError> {
        match self.field(name) {
            Some(Prop::Null) | None => Err(BridgeError::invalid_payload(format!(
                "missing field '{}'",
                name
            ))),
            Some(value) => Ok(value),
        }
    }

    /// Read a required string member
    pub fn str_field(&self, name: &str) -> Result<String, BridgeError> {
        match self.require(name)? {
            Prop::String(s) => Ok(s),
            other => Err(BridgeError::invalid_payload(format!(
                "field '{}' must be a string, got {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Read an optional string member
    pub fn opt_str_field(&self, name: &str) -> Option<String> {
        match self.field(name) {
            Some(Prop::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Build a map from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Prop
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Prop>,
    {
        Prop::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Null => f.write_str("Null"),
            Prop::Bool(b) => write!(f, "Bool({})", b),
            Prop::Number(n) => write!(f, "Number({})", n),
            Prop::String(s) => write!(f, "String({:?})", s),
            Prop::List(items) => f.debug_list().entries(items).finish(),
            Prop::Map(map) => f.debug_map().entries(map).finish(),
            Prop::Object(obj) => write!(f, "Object({})", obj.class_name()),
            Prop::Method(_) => f.write_str("Method"),
            Prop::Opaque(name) => write!(f, "Opaque({})", name),
        }
    }
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Prop::Null, Prop::Null) => true,
            (Prop::Bool(a), Prop::Bool(b)) => a == b,
            (Prop::Number(a), Prop::Number(b)) => a == b,
            (Prop::String(a), Prop::String(b)) => a == b,
            (Prop::List(a), Prop::List(b)) => a == b,
            (Prop::Map(a), Prop::Map(b)) => a == b,
            (Prop::Object(a), Prop::Object(b)) => Arc::ptr_eq(a, b),
            (Prop::Method(a), Prop::Method(b)) => a.ptr_eq(b),
            (Prop::Opaque(a), Prop::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Prop::Null,
            Value::Bool(b) => Prop::Bool(b),
            Value::Number(n) => Prop::Number(n),
            Value::String(s) => Prop::String(s),
            Value::Array(items) => Prop::List(items.into_iter().map(Prop::from).collect()),
            Value::Object(map) => {
                Prop::Map(map.into_iter().map(|(k, v)| (k, Prop::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Prop {
    fn from(s: &str) -> Self {
        Prop::String(s.to_string())
    }
}

impl From<String> for Prop {
    fn from(s: String) -> Self {
        Prop::String(s)
    }
}

impl From<bool> for Prop {
    fn from(b: bool) -> Self {
        Prop::Bool(b)
    }
}

impl From<i64> for Prop {
    fn from(n: i64) -> Self {
        Prop::Number(n.into())
    }
}

impl From<u64> for Prop {
    fn from(n: u64) -> Self {
        Prop::Number(n.into())
    }
}

impl From<f64> for Prop {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Prop::Number).unwrap_or(Prop::Null)
    }
}

impl From<ObjectRef> for Prop {
    fn from(obj: ObjectRef) -> Self {
        Prop::Object(obj)
    }
}

impl From<Method> for Prop {
    fn from(method: Method) -> Self {
        Prop::Method(method)
    }
}

impl From<Vec<Prop>> for Prop {
    fn from(items: Vec<Prop>) -> Self {
        Prop::List(items)
    }
}
