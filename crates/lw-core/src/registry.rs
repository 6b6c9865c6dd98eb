//! Connection table mapping connection ids to live GUI objects
//!
//! One registry is shared by every bridge in a process. Registration wires a
//! one-shot cleanup into the object's disposal signal, so a disposed object
//! is never found again. Objects without a native signal get one
//! synthesized and owned here; the object itself is left untouched.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

use lw_protocol::{ConnectionId, CONNECTION_CLASS, SHELL_CONNECTION_CLASS};

use crate::error::BridgeError;
use crate::object::{Disposable, DisposeSignal, GuiObject, ObjectKey, ObjectRef, Prop};

/// A signal the registry created for an object lacking one
///
/// The weak owner pins the object's allocation, so its key cannot be reused
/// by another object while this entry exists.
struct Synthesized {
    owner: Weak<GuiObject>,
    signal: Arc<DisposeSignal>,
}

impl Synthesized {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0 && !self.signal.is_disposed()
    }
}

/// Process-wide `cid -> object` table with a reverse index
#[derive(Default)]
pub struct ObjectRegistry {
    /// cid -> registered object
    objects: DashMap<String, Disposable>,
    /// object -> last cid it was registered under
    reverse: DashMap<ObjectKey, String>,
    /// Signals created for objects lacking a native one
    synthesized: DashMap<ObjectKey, Synthesized>,
    /// Waiters for cids referenced before registration
    pending: DashMap<String, Vec<oneshot::Sender<Disposable>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` under `cid`
    ///
    /// Registering the same object again under the same id is a no-op.
    pub fn register(self: &Arc<Self>, cid: &str, object: &ObjectRef) -> Result<Disposable, BridgeError> {
        if cid.is_empty() {
            return Err(BridgeError::Registration("empty connection id".to_string()));
        }

        let key = ObjectKey::of(object);
        let handle = match self.objects.entry(cid.to_string()) {
            MapEntry::Occupied(existing) => {
                if !Arc::ptr_eq(existing.get().object(), object) {
                    return Err(BridgeError::RegistrationConflict(cid.to_string()));
                }
                if existing.get().is_disposed() {
                    return Err(disposed_error(object));
                }
                return Ok(existing.get().clone());
            }
            MapEntry::Vacant(slot) => {
                // Only a winning registration may synthesize a signal
                let signal = self.signal_for(object);
                if signal.is_disposed() {
                    return Err(disposed_error(object));
                }
                let handle = Disposable::new(object.clone(), signal);
                slot.insert(handle.clone());
                handle
            }
        };
        self.reverse.insert(key, cid.to_string());

        let registry = Arc::downgrade(self);
        let owned_cid = cid.to_string();
        let subscribed = handle.signal().subscribe(move || {
            if let Some(registry) = Weak::upgrade(&registry) {
                registry.forget(&owned_cid, key);
            }
        });
        if subscribed.is_none() {
            // Disposed between the check above and the subscription
            self.forget(cid, key);
            return Err(BridgeError::Registration(format!(
                "{} was disposed during registration",
                object.class_name()
            )));
        }

        tracing::debug!("Registered {} as {}", object.class_name(), cid);

        if let Some((_, waiters)) = self.pending.remove(cid) {
            for waiter in waiters {
                let _ = waiter.send(handle.clone());
            }
        }

        Ok(handle)
    }

    /// Register a dynamic value, which must be a live object
    pub fn register_value(self: &Arc<Self>, cid: &str, value: &Prop) -> Result<Disposable, BridgeError> {
        match value {
            Prop::Object(object) => self.register(cid, object),
            other => Err(BridgeError::Registration(format!(
                "expected an object, got {}",
                other.type_name()
            ))),
        }
    }

    fn forget(&self, cid: &str, key: ObjectKey) {
        self.objects
            .remove_if(cid, |_, handle| ObjectKey::of(handle.object()) == key);
        self.reverse.remove_if(&key, |_, registered| registered == cid);
        tracing::debug!("Unregistered {}", cid);
    }

    /// Find the live object registered under `cid`
    pub fn lookup(&self, cid: &str) -> Option<ObjectRef> {
        self.lookup_handle(cid).map(|handle| handle.object().clone())
    }

    /// Find the registered object together with its governing signal
    pub fn lookup_handle(&self, cid: &str) -> Option<Disposable> {
        self.objects
            .get(cid)
            .filter(|handle| !handle.is_disposed())
            .map(|handle| handle.clone())
    }

    /// The id an object was last registered under
    pub fn id_of(&self, object: &ObjectRef) -> Option<String> {
        self.reverse
            .get(&ObjectKey::of(object))
            .map(|cid| cid.clone())
    }

    /// Return the object's id, minting and registering one when allowed
    ///
    /// Objects currently attached to the shell get a `ShellConnection` id so
    /// a peer connecting with it gets a shell connection back.
    pub fn get_or_assign_id(
        self: &Arc<Self>,
        object: &ObjectRef,
        register_if_absent: bool,
    ) -> Result<Option<String>, BridgeError> {
        if let Some(cid) = self.id_of(object) {
            return Ok(Some(cid));
        }
        if !register_if_absent {
            return Ok(None);
        }

        let class = if object.is_attached() {
            SHELL_CONNECTION_CLASS
        } else {
            CONNECTION_CLASS
        };
        let cid = ConnectionId::new(class).to_string();
        self.register(&cid, object)?;
        Ok(Some(cid))
    }

    /// The signal governing an object, without creating one
    pub fn signal_of(&self, object: &ObjectRef) -> Option<Arc<DisposeSignal>> {
        object.signal().cloned().or_else(|| {
            self.synthesized
                .get(&ObjectKey::of(object))
                .filter(|entry| entry.is_live())
                .map(|entry| entry.signal.clone())
        })
    }

    /// The signal governing an object, synthesizing one if needed
    ///
    /// A synthesized signal lives until it fires or its object is dropped.
    pub fn signal_for(self: &Arc<Self>, object: &ObjectRef) -> Arc<DisposeSignal> {
        if let Some(signal) = object.signal() {
            return signal.clone();
        }
        if let Some(signal) = self.signal_of(object) {
            return signal;
        }

        self.synthesized.retain(|_, entry| entry.is_live());

        let key = ObjectKey::of(object);
        let signal = match self.synthesized.entry(key) {
            MapEntry::Occupied(existing) if existing.get().is_live() => {
                return existing.get().signal.clone();
            }
            MapEntry::Occupied(mut stale) => {
                let signal = Arc::new(DisposeSignal::new());
                stale.insert(Synthesized {
                    owner: Arc::downgrade(object),
                    signal: signal.clone(),
                });
                signal
            }
            MapEntry::Vacant(slot) => {
                let signal = Arc::new(DisposeSignal::new());
                slot.insert(Synthesized {
                    owner: Arc::downgrade(object),
                    signal: signal.clone(),
                });
                signal
            }
        };

        let registry = Arc::downgrade(self);
        let fired = Arc::downgrade(&signal);
        signal.subscribe(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .synthesized
                    .remove_if(&key, |_, entry| std::ptr::eq(Arc::as_ptr(&entry.signal), fired.as_ptr()));
            }
        });
        signal
    }

    /// Dispose the object registered under `cid`
    pub fn dispose(&self, cid: &str) -> bool {
        self.lookup_handle(cid).map_or(false, |handle| handle.dispose())
    }

    /// Wait until an object is registered under `cid`
    ///
    /// Returns `None` if the waiter is released before registration. A waiter
    /// dropped early removes itself from the pending table.
    pub async fn wait_for(&self, cid: &str) -> Option<Disposable> {
        let receiver = {
            let mut waiters = self.pending.entry(cid.to_string()).or_default();
            // Checked under the pending lock so a concurrent register cannot slip past
            match self.lookup_handle(cid) {
                Some(handle) => {
                    drop(waiters);
                    self.pending.remove_if(cid, |_, w| w.is_empty());
                    return Some(handle);
                }
                None => {
                    waiters.retain(|w| !w.is_closed());
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };

        let mut waiter = PendingWaiter {
            registry: self,
            cid,
            receiver: Some(receiver),
        };
        match waiter.receiver.as_mut() {
            Some(receiver) => receiver.await.ok(),
            None => None,
        }
    }

    /// Drop closed waiters for `cid`, and its entry once none remain
    fn prune_waiters(&self, cid: &str) {
        if let Some(mut waiters) = self.pending.get_mut(cid) {
            waiters.retain(|w| !w.is_closed());
        }
        self.pending.remove_if(cid, |_, w| w.is_empty());
    }

    /// Drop every waiter for `cid`
    pub fn release_waiters(&self, cid: &str) {
        if self.pending.remove(cid).is_some() {
            tracing::debug!("Released waiters for {}", cid);
        }
    }

    /// Number of registered ids
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of live waiters across all ids
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .map(|e| e.value().iter().filter(|w| !w.is_closed()).count())
            .sum()
    }

    /// Number of ids with a pending-waiter entry, live or not
    pub fn pending_ids(&self) -> usize {
        self.pending.len()
    }

    /// Number of signals synthesized for unsignalled objects
    pub fn synthesized_count(&self) -> usize {
        self.synthesized.len()
    }
}

fn disposed_error(object: &ObjectRef) -> BridgeError {
    BridgeError::Registration(format!("{} is already disposed", object.class_name()))
}

/// Receiver half of a `wait_for` that prunes the pending table when dropped
struct PendingWaiter<'a> {
    registry: &'a ObjectRegistry,
    cid: &'a str,
    receiver: Option<oneshot::Receiver<Disposable>>,
}

impl Drop for PendingWaiter<'_> {
    fn drop(&mut self) {
        // Closing the receiver first marks our sender closed
        self.receiver.take();
        self.registry.prune_waiters(self.cid);
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("objects", &self.objects.len())
            .field("pending", &self.pending.len())
            .field("synthesized", &self.synthesized.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> Arc<ObjectRegistry> {
        Arc::new(ObjectRegistry::new())
    }

    #[test]
    fn test_register_rejects_empty_and_disposed() {
        let reg = registry();
        let obj = GuiObject::builder("Panel").disposable().build();
        assert!(matches!(
            reg.register("", &obj),
            Err(BridgeError::Registration(_))
        ));

        obj.dispose();
        assert!(matches!(
            reg.register("labwire-Connection|1", &obj),
            Err(BridgeError::Registration(_))
        ));
    }

    #[test]
    fn test_register_value_requires_object() {
        let reg = registry();
        assert!(reg.register_value("x", &Prop::from(3i64)).is_err());
    }

    #[test]
    fn test_reverse_tracks_last_id() {
        let reg = registry();
        let obj = GuiObject::empty("Panel");
        reg.register("first", &obj).unwrap();
        reg.register("second", &obj).unwrap();

        assert_eq!(reg.id_of(&obj).as_deref(), Some("second"));
        assert!(reg.lookup("first").is_some());
        assert!(reg.lookup("second").is_some());
    }

    #[test]
    fn test_synthesized_signal_cleans_up() {
        let reg = registry();
        let obj = GuiObject::empty("Plain");
        reg.register("c", &obj).unwrap();
        assert!(reg.signal_of(&obj).is_some());

        assert!(reg.dispose("c"));
        assert!(reg.lookup("c").is_none());
        assert!(reg.id_of(&obj).is_none());
        assert!(reg.signal_of(&obj).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_get_or_assign_id_prefix() {
        let reg = registry();
        let loose = GuiObject::empty("Thing");
        let placed = GuiObject::empty("Widget");
        placed.set_attached(true);

        assert_eq!(reg.get_or_assign_id(&loose, false).unwrap(), None);
        let loose_id = reg.get_or_assign_id(&loose, true).unwrap().unwrap();
        let placed_id = reg.get_or_assign_id(&placed, true).unwrap().unwrap();

        assert!(loose_id.starts_with("labwire-Connection|"));
        assert!(placed_id.starts_with("labwire-ShellConnection|"));
        assert_eq!(reg.get_or_assign_id(&loose, true).unwrap(), Some(loose_id));
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_register() {
        let reg = registry();
        let obj = GuiObject::empty("Late");

        let r = reg.clone();
        let waiter = tokio::spawn(async move { r.wait_for("late").await });
        tokio::task::yield_now().await;
        while reg.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        reg.register("late", &obj).unwrap();
        let handle = waiter.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(handle.object(), &obj));
        assert_eq!(reg.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_existing_returns_immediately() {
        let reg = registry();
        let obj = GuiObject::empty("Early");
        reg.register("early", &obj).unwrap();
        assert!(reg.wait_for("early").await.is_some());
        assert_eq!(reg.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_release_waiters_rejects() {
        let reg = registry();
        let r = reg.clone();
        let waiter = tokio::spawn(async move { r.wait_for("never").await });
        while reg.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        reg.release_waiters("never");
        assert!(waiter.await.unwrap().is_none());
    }
    #[test]
    fn test_conflict_leaves_no_signal_behind() {
        let reg = registry();
        let first = GuiObject::empty("Plain");
        let second = GuiObject::empty("Plain");
        reg.register("a", &first).unwrap();

        assert!(matches!(
            reg.register("a", &second),
            Err(BridgeError::RegistrationConflict(_))
        ));
        assert!(reg.signal_of(&second).is_none());
        assert!(reg.id_of(&second).is_none());
        assert_eq!(reg.synthesized_count(), 1);
    }

    #[test]
    fn test_unregistered_signal_reclaimed_on_dispose() {
        let reg = registry();
        let obj = GuiObject::empty("Panel");
        let signal = reg.signal_for(&obj);
        assert!(Arc::ptr_eq(&signal, &reg.signal_for(&obj)));
        assert_eq!(reg.synthesized_count(), 1);

        signal.dispose();
        assert_eq!(reg.synthesized_count(), 0);
        assert!(reg.signal_of(&obj).is_none());
    }

    #[test]
    fn test_fresh_objects_never_inherit_stale_signals() {
        let reg = registry();
        for i in 0..64 {
            let old = GuiObject::empty("Panel");
            reg.signal_for(&old).dispose();
            drop(old);

            let leaked = GuiObject::empty("Panel");
            reg.signal_for(&leaked);
            drop(leaked);

            let next = GuiObject::empty("Panel");
            assert!(reg.signal_of(&next).is_none());
            let cid = format!("labwire-Connection|{}", i);
            let handle = reg.register(&cid, &next).unwrap();
            assert!(!handle.is_disposed());
            assert!(reg.dispose(&cid));
        }
        assert!(reg.is_empty());
        assert!(reg.synthesized_count() <= 1);
    }

    #[tokio::test]
    async fn test_dropped_waiters_leave_no_entries() {
        let reg = registry();
        for i in 0..100 {
            let cid = format!("never-{}", i);
            let waited = tokio::time::timeout(Duration::from_millis(1), reg.wait_for(&cid)).await;
            assert!(waited.is_err());
        }
        assert_eq!(reg.pending_count(), 0);
        assert_eq!(reg.pending_ids(), 0);

        let r = reg.clone();
        let waiter = tokio::spawn(async move { r.wait_for("aborted").await });
        while reg.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(reg.pending_ids(), 0);
    }
}
