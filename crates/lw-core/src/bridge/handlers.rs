//! Operation handler tables
//!
//! Each model type owns a table of named handlers. Tables chain to a parent,
//! so a specialization only lists what it adds and lookups fall back to the
//! generic operations every bridge understands.

use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use crate::access;
use crate::error::BridgeError;
use crate::introspect;
use crate::object::Prop;

use super::Bridge;

/// Future returned by a handler
pub type HandlerFuture = BoxFuture<'static, Result<Prop, BridgeError>>;

/// An inbound operation implementation
pub type Handler = Arc<dyn Fn(Arc<Bridge>, Prop) -> HandlerFuture + Send + Sync>;

/// Named handlers with an optional parent table
pub struct HandlerTable {
    name: String,
    handlers: HashMap<String, Handler>,
    parent: Option<Arc<HandlerTable>>,
}

impl HandlerTable {
    /// A table with no parent
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            parent: None,
        }
    }

    /// A table that falls back to `parent`
    pub fn extending(name: impl Into<String>, parent: Arc<HandlerTable>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(name)
        }
    }

    /// Add a handler, shadowing any parent handler with the same name
    pub fn with<F, Fut>(mut self, operation: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Bridge>, Prop) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Prop, BridgeError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |bridge, payload| Box::pin(handler(bridge, payload)));
        self.handlers.insert(operation.into(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find a handler here or up the parent chain
    pub fn find(&self, operation: &str) -> Option<Handler> {
        let mut table = Some(self);
        while let Some(t) = table {
            if let Some(handler) = t.handlers.get(operation) {
                return Some(handler.clone());
            }
            table = t.parent.as_deref();
        }
        None
    }

    /// Every operation name reachable from this table
    pub fn operations(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        let mut table = Some(self);
        while let Some(t) = table {
            names.extend(t.handlers.keys().cloned());
            table = t.parent.as_deref();
        }
        names.into_iter().collect()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("name", &self.name)
            .field("operations", &self.operations())
            .finish()
    }
}

fn args_of(payload: &Prop) -> Vec<Prop> {
    match payload.field("args") {
        Some(Prop::List(items)) => items,
        Some(Prop::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

/// Generic operations against a bridge's base object
///
/// - `executeMethod {path, args?}`
/// - `getProperty {path, nullIfMissing?}`
/// - `setProperty {path, value}`
/// - `updateProperty {path, value}`
/// - `listProperties {path?, depth?, omitHidden?}`
pub fn base_handlers() -> Arc<HandlerTable> {
    static BASE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    BASE.get_or_init(|| {
        HandlerTable::new("Base")
            .with("executeMethod", |bridge, payload| async move {
                let base = Prop::Object(bridge.require_base()?);
                let path = payload.str_field("path")?;
                access::execute_method(&base, &path, args_of(&payload)).await
            })
            .with("getProperty", |bridge, payload| async move {
                let base = Prop::Object(bridge.require_base()?);
                let path = payload.opt_str_field("path").unwrap_or_default();
                let null_if_missing = payload
                    .field("nullIfMissing")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                access::get(&base, &path, null_if_missing)
            })
            .with("setProperty", |bridge, payload| async move {
                let mut base = Prop::Object(bridge.require_base()?);
                let path = payload.str_field("path")?;
                let value = payload.field("value").unwrap_or_default();
                access::set(&mut base, &path, value)?;
                Ok(Prop::Null)
            })
            .with("updateProperty", |bridge, payload| async move {
                let mut base = Prop::Object(bridge.require_base()?);
                let path = payload.opt_str_field("path").unwrap_or_default();
                let value = payload.require("value")?;
                access::update(&mut base, &path, value)?;
                Ok(Prop::Null)
            })
            .with("listProperties", |bridge, payload| async move {
                let base = Prop::Object(bridge.require_base()?);
                let path = payload.opt_str_field("path").unwrap_or_default();
                let target = access::get(&base, &path, false)?;

                let config = &bridge.ctx().config;
                let depth = payload
                    .field("depth")
                    .and_then(|v| v.as_i64())
                    .map(|d| d.max(1) as usize)
                    .unwrap_or(config.introspection_depth);
                let omit_hidden = payload
                    .field("omitHidden")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(config.omit_hidden);

                Ok(Prop::from(introspect::list_properties(
                    &target,
                    depth,
                    omit_hidden,
                )))
            })
            .into_shared()
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup_and_shadowing() {
        let child = HandlerTable::extending("Child", base_handlers())
            .with("getProperty", |_, _| async { Ok(Prop::from("shadowed")) })
            .with("extra", |_, _| async { Ok(Prop::Null) });

        assert!(child.find("extra").is_some());
        assert!(child.find("setProperty").is_some());
        assert!(child.find("nothing").is_none());

        let ops = child.operations();
        assert!(ops.contains(&"listProperties".to_string()));
        assert_eq!(ops.iter().filter(|o| *o == "getProperty").count(), 1);
    }

    #[test]
    fn test_args_forms() {
        use serde_json::json;
        assert!(args_of(&Prop::from(json!({}))).is_empty());
        assert_eq!(args_of(&Prop::from(json!({"args": [1, 2]}))).len(), 2);
        assert_eq!(args_of(&Prop::from(json!({"args": "x"}))).len(), 1);
    }
}
