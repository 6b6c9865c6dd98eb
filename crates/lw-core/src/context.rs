//! Process-wide state shared by every bridge

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::object::ObjectRef;
use crate::registry::ObjectRegistry;
use crate::transform::{FunctionTable, TransformContext};

/// Live bridges by model id
#[derive(Default)]
pub struct ModelTable {
    models: DashMap<String, Weak<Bridge>>,
}

impl ModelTable {
    pub fn insert(&self, id: impl Into<String>, bridge: &Arc<Bridge>) {
        self.models.insert(id.into(), Arc::downgrade(bridge));
    }

    pub fn get(&self, id: &str) -> Option<Arc<Bridge>> {
        self.models.get(id).and_then(|weak| weak.upgrade())
    }

    pub fn remove(&self, id: &str) {
        self.models.remove(id);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Ids of bridges still alive
    pub fn ids(&self) -> Vec<String> {
        self.models
            .iter()
            .filter(|e| e.value().strong_count() > 0)
            .map(|e| e.key().clone())
            .collect()
    }
}

/// Completion flag for the host's view restoration
///
/// Shell connections wait on it before looking for their widget, so widgets
/// recreated by restoration are found rather than timed out.
#[derive(Debug, Clone, Default)]
pub struct Restoration {
    done: CancellationToken,
}

impl Restoration {
    /// Mark restoration finished and wake every waiter
    pub fn finish(&self) {
        self.done.cancel();
    }

    pub fn is_restored(&self) -> bool {
        self.done.is_cancelled()
    }

    pub async fn wait(&self) {
        self.done.cancelled().await
    }

    /// A restoration that has already finished
    pub fn completed() -> Self {
        let restoration = Self::default();
        restoration.finish();
        restoration
    }
}

/// Async mutexes looked up by name
#[derive(Default)]
pub struct NamedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NamedLocks {
    /// Acquire the lock for `name`, creating it on first use
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the lock for `name` if nobody holds or waits on it
    pub fn release(&self, name: &str) {
        self.locks
            .remove_if(name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Shared services injected into every bridge
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub registry: Arc<ObjectRegistry>,
    pub functions: Arc<FunctionTable>,
    pub models: ModelTable,
    pub restoration: Restoration,
    pub locks: NamedLocks,
    anchor: Option<ObjectRef>,
}

impl BridgeContext {
    /// Context with fresh services and no anchor object
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ObjectRegistry::new()),
            functions: Arc::new(FunctionTable::new()),
            models: ModelTable::default(),
            restoration: Restoration::completed(),
            locks: NamedLocks::default(),
            anchor: None,
        }
    }

    /// Set the well-known object base paths are resolved against
    pub fn with_anchor(mut self, anchor: ObjectRef) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Replace the restoration flag, e.g. with one still in progress
    pub fn with_restoration(mut self, restoration: Restoration) -> Self {
        self.restoration = restoration;
        self
    }

    pub fn anchor(&self) -> Option<&ObjectRef> {
        self.anchor.as_ref()
    }

    pub fn transform_context(&self) -> TransformContext {
        TransformContext {
            registry: self.registry.clone(),
            functions: self.functions.clone(),
        }
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}
