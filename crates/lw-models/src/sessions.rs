//! Session model
//!
//! Start, stop and list kernel sessions backing notebooks and consoles.
//! Starting a session awaits its kernel launch and shutting one down awaits
//! the kernel stop. Sequences issued through one bridge hold a lock named
//! after the bridge id, so a shutdown never interleaves with a start from the
//! same model.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use lw_core::{
    base_handlers, BaseSource, Bridge, BridgeError, GuiObject, HandlerTable, ModelSpec, ObjectRef,
    Prop,
};

use crate::app::{child_object, SESSIONS_PATH};

/// Model class name
pub const CLASS: &str = "Sessions";

/// Kernel used when none is named
pub const DEFAULT_KERNEL: &str = "python3";

/// Starts and stops the kernels behind sessions
#[async_trait]
pub trait KernelLauncher: Send + Sync {
    /// Start a kernel and return its id
    async fn start(&self, kernel_name: &str) -> Result<String, BridgeError>;

    /// Stop a running kernel
    async fn stop(&self, kernel_id: &str) -> Result<(), BridgeError>;
}

/// Launcher that only tracks kernels in memory
#[derive(Default)]
pub struct LocalKernels {
    running: DashMap<String, String>,
}

impl LocalKernels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of kernels started and not yet stopped
    pub fn running(&self) -> usize {
        self.running.len()
    }
}

#[async_trait]
impl KernelLauncher for LocalKernels {
    async fn start(&self, kernel_name: &str) -> Result<String, BridgeError> {
        if kernel_name.is_empty() {
            return Err(BridgeError::invalid_payload("kernel name is empty"));
        }
        let id = Uuid::new_v4().to_string();
        self.running.insert(id.clone(), kernel_name.to_string());
        tracing::debug!("Started {} kernel {}", kernel_name, id);
        Ok(id)
    }

    async fn stop(&self, kernel_id: &str) -> Result<(), BridgeError> {
        self.running
            .remove(kernel_id)
            .map(|_| tracing::debug!("Stopped kernel {}", kernel_id))
            .ok_or_else(|| BridgeError::invalid_payload(format!("no kernel {}", kernel_id)))
    }
}

/// Build an empty session manager
pub fn create_session_manager() -> ObjectRef {
    GuiObject::builder("SessionManager")
        .prop("sessions", GuiObject::empty("SessionMap"))
        .build()
}

fn status_of(session: &ObjectRef) -> Option<String> {
    session
        .get("status")
        .and_then(|s| s.as_str().map(str::to_string))
}

/// Start a session and wait for its kernel; disposing it shuts it down
///
/// The session is listed as `starting` while the kernel launches.
pub async fn start_session(
    manager: &ObjectRef,
    kernels: &Arc<dyn KernelLauncher>,
    path: &str,
    kernel_name: &str,
    kind: &str,
) -> Result<ObjectRef, BridgeError> {
    let sessions = child_object(manager, "sessions")?;
    let id = Uuid::new_v4().to_string();
    let session = GuiObject::builder("Session")
        .prop("id", id.clone())
        .prop("path", path)
        .prop("kernelName", kernel_name)
        .prop("type", kind)
        .prop("status", "starting")
        .disposable()
        .build();
    sessions.set(id.clone(), session.clone());

    let kernel_id = match kernels.start(kernel_name).await {
        Ok(kernel_id) => kernel_id,
        Err(e) => {
            sessions.remove(&id);
            return Err(e);
        }
    };
    session.set("kernelId", kernel_id.clone());
    session.set("status", "idle");

    if let Some(signal) = session.signal() {
        let weak_sessions = Arc::downgrade(&sessions);
        let weak_session = Arc::downgrade(&session);
        let launcher = kernels.clone();
        let session_id = id.clone();
        let kernel = kernel_id.clone();
        let subscribed = signal.subscribe(move || {
            if let Some(sessions) = weak_sessions.upgrade() {
                sessions.remove(&session_id);
            }
            // Disposed without a shutdown: the kernel still runs
            let stopped = weak_session
                .upgrade()
                .map_or(false, |s| status_of(&s).as_deref() == Some("dead"));
            if stopped {
                return;
            }
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = launcher.stop(&kernel).await {
                        tracing::warn!("Failed to stop kernel {}: {}", kernel, e);
                    }
                });
            }
        });
        if subscribed.is_none() {
            sessions.remove(&id);
            kernels.stop(&kernel_id).await?;
            return Err(BridgeError::invalid_payload(format!(
                "session {} was disposed while starting",
                id
            )));
        }
    }

    tracing::info!("Started {} session {} for {}", kind, id, path);
    Ok(session)
}

/// Shut a session down; `false` if it was not running
pub async fn shutdown(
    manager: &ObjectRef,
    kernels: &Arc<dyn KernelLauncher>,
    id: &str,
) -> Result<bool, BridgeError> {
    let sessions = child_object(manager, "sessions")?;
    let Some(Prop::Object(session)) = sessions.get_own(id) else {
        return Ok(false);
    };
    if session.is_disposed() {
        return Ok(false);
    }

    session.set("status", "terminating");
    if let Some(kernel_id) = session.get("kernelId").and_then(|k| k.as_str().map(str::to_string)) {
        kernels.stop(&kernel_id).await?;
    }
    session.set("status", "dead");
    session.dispose();
    tracing::info!("Shut down session {}", id);
    Ok(true)
}

/// Summaries of running sessions, ordered by id
pub fn list_sessions(manager: &ObjectRef) -> Result<Vec<Prop>, BridgeError> {
    let sessions = child_object(manager, "sessions")?;
    Ok(sessions
        .entries()
        .into_iter()
        .filter_map(|(_, session)| session.as_object().cloned())
        .map(|session| {
            Prop::map(
                ["id", "path", "kernelName", "type", "status"]
                    .into_iter()
                    .map(|key| (key, session.get(key).unwrap_or_default())),
            )
        })
        .collect())
}

fn release_lock(bridge: &Bridge) {
    bridge.ctx().locks.release(bridge.id());
}

async fn start_from(
    bridge: Arc<Bridge>,
    payload: Prop,
    kernels: Arc<dyn KernelLauncher>,
    kind: &str,
) -> Result<Prop, BridgeError> {
    let manager = bridge.require_base()?;
    let path = payload.str_field("path")?;
    let kernel = payload
        .opt_str_field("kernelName")
        .unwrap_or_else(|| DEFAULT_KERNEL.to_string());
    let _guard = bridge.ctx().locks.lock(bridge.id()).await;
    let session = start_session(&manager, &kernels, &path, &kernel, kind).await?;
    Ok(Prop::Object(session))
}

/// Handler table starting kernels through `kernels`
pub fn handlers(kernels: Arc<dyn KernelLauncher>) -> Arc<HandlerTable> {
    let notebooks = kernels.clone();
    let consoles = kernels.clone();
    let stopper = kernels;

    HandlerTable::extending(CLASS, base_handlers())
        .with("newSession", move |bridge, payload| {
            start_from(bridge, payload, notebooks.clone(), "notebook")
        })
        .with("openConsole", move |bridge, payload| {
            start_from(bridge, payload, consoles.clone(), "console")
        })
        .with("shutdown", move |bridge, payload| {
            let kernels = stopper.clone();
            async move {
                let manager = bridge.require_base()?;
                let id = payload.str_field("id")?;
                let _guard = bridge.ctx().locks.lock(bridge.id()).await;
                Ok(Prop::from(shutdown(&manager, &kernels, &id).await?))
            }
        })
        .with("listSessions", |bridge, _| async move {
            Ok(Prop::List(list_sessions(&bridge.require_base()?)?))
        })
        .into_shared()
}

/// Model bound to the session manager
pub fn spec(kernels: Arc<dyn KernelLauncher>) -> ModelSpec {
    ModelSpec::new(
        CLASS,
        handlers(kernels),
        BaseSource::Path(SESSIONS_PATH.to_string()),
    )
    .on_close(release_lock)
}
