//! Reference-counted GUI objects with a prototype chain

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::dispose::DisposeSignal;
use super::prop::{Method, MethodFuture, Prop};
use crate::error::BridgeError;

/// Shared handle to a GUI object
pub type ObjectRef = Arc<GuiObject>;

/// Identity of an object, usable as a map key while the object is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey(usize);

impl ObjectKey {
    pub fn of(object: &ObjectRef) -> Self {
        Self(Arc::as_ptr(object) as usize)
    }
}

/// A GUI-side object
///
/// Own properties live in a concurrent table so handlers on different tasks
/// can read and write without an outer lock. Lookups fall back to the
/// prototype chain.
pub struct GuiObject {
    class_name: String,
    props: DashMap<String, Prop>,
    proto: Option<ObjectRef>,
    signal: Option<Arc<DisposeSignal>>,
    attached: AtomicBool,
    dispose_on_close: AtomicBool,
}

impl GuiObject {
    /// Start building an object of the given class
    pub fn builder(class_name: impl Into<String>) -> GuiObjectBuilder {
        GuiObjectBuilder {
            class_name: class_name.into(),
            props: Vec::new(),
            proto: None,
            disposable: false,
        }
    }

    /// Plain object with no members
    pub fn empty(class_name: impl Into<String>) -> ObjectRef {
        Self::builder(class_name).build()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.proto.as_ref()
    }

    /// Look up a member on the object or its prototype chain
    pub fn get(&self, name: &str) -> Option<Prop> {
        if let Some(value) = self.props.get(name) {
            return Some(value.clone());
        }
        let mut proto = self.proto.clone();
        while let Some(p) = proto {
            if let Some(value) = p.props.get(name) {
                return Some(value.clone());
            }
            proto = p.proto.clone();
        }
        None
    }

    /// Look up an own member only
    pub fn get_own(&self, name: &str) -> Option<Prop> {
        self.props.get(name).map(|v| v.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign an own member, returning the previous value
    pub fn set(&self, name: impl Into<String>, value: impl Into<Prop>) -> Option<Prop> {
        self.props.insert(name.into(), value.into())
    }

    pub fn remove(&self, name: &str) -> Option<Prop> {
        self.props.remove(name).map(|(_, v)| v)
    }

    /// Own member names in sorted order
    pub fn own_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.props.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of own members in sorted order
    pub fn entries(&self) -> Vec<(String, Prop)> {
        let mut entries: Vec<(String, Prop)> = self
            .props
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// The object's native disposal signal, if it has one
    pub fn signal(&self) -> Option<&Arc<DisposeSignal>> {
        self.signal.as_ref()
    }

    pub fn is_disposable(&self) -> bool {
        self.signal.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.signal.as_ref().map_or(false, |s| s.is_disposed())
    }

    /// Fire the native disposal signal
    pub fn dispose(&self) -> bool {
        self.signal.as_ref().map_or(false, |s| s.dispose())
    }

    /// Whether the object currently sits in the visible shell
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    /// Whether a connection closing should dispose this object
    pub fn dispose_on_close(&self) -> bool {
        self.dispose_on_close.load(Ordering::SeqCst)
    }

    pub fn set_dispose_on_close(&self, value: bool) {
        self.dispose_on_close.store(value, Ordering::SeqCst);
    }

    /// Call a named method with `this` bound to the object
    pub fn invoke(self: &Arc<Self>, name: &str, args: Vec<Prop>) -> MethodFuture {
        match self.get(name) {
            Some(Prop::Method(method)) => method.call(Prop::Object(self.clone()), args),
            Some(other) => {
                let err = BridgeError::NotCallable(format!(
                    "{}.{} is {}",
                    self.class_name,
                    name,
                    other.type_name()
                ));
                Box::pin(futures::future::ready(Err(err)))
            }
            None => {
                let err = BridgeError::PropertyNotFound {
                    segment: name.to_string(),
                    path: name.to_string(),
                    detail: String::new(),
                };
                Box::pin(futures::future::ready(Err(err)))
            }
        }
    }
}

impl fmt::Debug for GuiObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuiObject")
            .field("class_name", &self.class_name)
            .field("props", &self.own_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for [`GuiObject`]
pub struct GuiObjectBuilder {
    class_name: String,
    props: Vec<(String, Prop)>,
    proto: Option<ObjectRef>,
    disposable: bool,
}

impl GuiObjectBuilder {
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    pub fn method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.props.push((name.into(), Prop::Method(method)));
        self
    }

    /// Inherit members from another object
    pub fn prototype(mut self, proto: ObjectRef) -> Self {
        self.proto = Some(proto);
        self
    }

    /// Give the object its own disposal signal
    pub fn disposable(mut self) -> Self {
        self.disposable = true;
        self
    }

    pub fn build(self) -> ObjectRef {
        let props = DashMap::new();
        for (name, value) in self.props {
            props.insert(name, value);
        }
        Arc::new(GuiObject {
            class_name: self.class_name,
            props,
            proto: self.proto,
            signal: self.disposable.then(|| Arc::new(DisposeSignal::new())),
            attached: AtomicBool::new(false),
            dispose_on_close: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_lookup() {
        let base = GuiObject::builder("Base").prop("kind", "base").build();
        let obj = GuiObject::builder("Widget")
            .prop("id", "w1")
            .prototype(base)
            .build();

        assert_eq!(obj.get("kind"), Some(Prop::from("base")));
        assert_eq!(obj.get_own("kind"), None);
        obj.set("kind", "own");
        assert_eq!(obj.get("kind"), Some(Prop::from("own")));
    }

    #[test]
    fn test_own_names_sorted() {
        let obj = GuiObject::builder("X").prop("b", 1i64).prop("a", 2i64).build();
        assert_eq!(obj.own_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_native_dispose() {
        let plain = GuiObject::empty("Plain");
        assert!(!plain.dispose());

        let obj = GuiObject::builder("Panel").disposable().build();
        assert!(obj.is_disposable());
        assert!(obj.dispose());
        assert!(obj.is_disposed());
    }

    #[tokio::test]
    async fn test_invoke_binds_this() {
        let obj = GuiObject::builder("Counter")
            .prop("count", 41i64)
            .method(
                "next",
                Method::sync(|this, _| {
                    let n = this.field("count").and_then(|c| c.as_i64()).unwrap_or(0);
                    Ok(Prop::from(n + 1))
                }),
            )
            .build();

        assert_eq!(obj.invoke("next", vec![]).await.unwrap(), Prop::from(42i64));
        assert!(matches!(
            obj.invoke("count", vec![]).await,
            Err(BridgeError::NotCallable(_))
        ));
    }
}
