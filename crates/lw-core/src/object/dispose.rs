//! Disposal notification primitive

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::gui::ObjectRef;

type Listener = Box<dyn FnOnce() + Send + Sync>;

/// Handle returned by [`DisposeSignal::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// One-shot disposed notification
///
/// `dispose` flips the flag and fires every listener exactly once. Listeners
/// subscribed after disposal are rejected rather than queued.
pub struct DisposeSignal {
    disposed: AtomicBool,
    token: CancellationToken,
    listeners: DashMap<u64, Listener>,
    next_id: AtomicU64,
}

impl DisposeSignal {
    /// Create a live signal
    pub fn new() -> Self {
        Self {
            disposed: AtomicBool::new(false),
            token: CancellationToken::new(),
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; `None` if the signal has already fired
    pub fn subscribe<F>(&self, listener: F) -> Option<Subscription>
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Box::new(listener));

        // A concurrent dispose may have swept before our insert landed
        if self.is_disposed() && self.listeners.remove(&id).is_some() {
            return None;
        }

        Some(Subscription(id))
    }

    /// Drop a listener without firing it
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.listeners.remove(&subscription.0).is_some()
    }

    /// Fire the signal; returns `false` if it had already fired
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let ids: Vec<u64> = self.listeners.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            // Removed before the call so listeners may touch the map
            if let Some((_, listener)) = self.listeners.remove(&id) {
                listener();
            }
        }

        self.token.cancel();
        true
    }

    /// Check whether the signal has fired
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires
    pub async fn disposed(&self) {
        self.token.cancelled().await
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for DisposeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DisposeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeSignal")
            .field("disposed", &self.is_disposed())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A registered object paired with the signal that governs its lifetime
///
/// The signal is the object's own when it has one, otherwise one the
/// registry synthesized for it. The object itself is never modified.
#[derive(Debug, Clone)]
pub struct Disposable {
    object: ObjectRef,
    signal: Arc<DisposeSignal>,
}

impl Disposable {
    pub fn new(object: ObjectRef, signal: Arc<DisposeSignal>) -> Self {
        Self { object, signal }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn signal(&self) -> &Arc<DisposeSignal> {
        &self.signal
    }

    /// Dispose the object through its governing signal
    pub fn dispose(&self) -> bool {
        self.signal.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.signal.is_disposed()
    }
}
