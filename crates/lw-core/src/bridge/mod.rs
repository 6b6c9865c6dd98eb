//! The bridge instance: request/response correlation over one channel
//!
//! A bridge owns one channel and, on the GUI side, one base object. It
//! serves operations the peer asks for by dispatching them through its
//! handler table, and lets local code schedule operations on the peer,
//! awaiting the matching response.
//!
//! # Lifecycle
//!
//! 1. `Initializing`: the base is resolved (directly, by path against the
//!    context anchor, or by waiting for a registered connection id).
//!    Requests arriving meanwhile are buffered.
//! 2. `Ready`: buffered and new requests are served.
//! 3. `Closing`/`Closed`: in-flight outbound operations are rejected, the
//!    peer is told unless it initiated the close, the close hook runs, and
//!    the base is released.

mod handlers;

pub use handlers::{base_handlers, Handler, HandlerFuture, HandlerTable};

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lw_protocol::{Envelope, Request, Response, Side};

use crate::access;
use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::object::{DisposeSignal, ObjectRef, Prop, Subscription};
use crate::transform::Transform;
use crate::transport::{Channel, ChannelSender};
use crate::wire;

/// Payload key listing paths whose identifiers must become live objects
pub const SUBSTITUTE_KEY: &str = "toObject";

/// Lifecycle state of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Initializing,
    Ready,
    Closing,
    Closed,
}

/// Why a bridge closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Local code asked for it
    Requested,
    /// The peer sent a close notification
    Remote,
    /// The channel ended
    ChannelLost,
    /// The base object was disposed
    BaseDisposed,
    /// The owning kernel session ended
    SessionEnded,
    /// Base resolution failed
    InitFailed,
}

impl CloseReason {
    /// Whether the peer still needs to be told
    fn notifies_peer(self) -> bool {
        matches!(
            self,
            CloseReason::Requested | CloseReason::BaseDisposed | CloseReason::SessionEnded
        )
    }
}

/// How a bridge finds its base object
#[derive(Debug, Clone, Default)]
pub enum BaseSource {
    /// No base; only operations that do not need one work
    #[default]
    None,
    /// A given object
    Object(ObjectRef),
    /// A path resolved against the context anchor
    Path(String),
    /// The object registered under a connection id, waited for if absent
    Connection { cid: String },
    /// Like `Connection`, but only looked for once view restoration is done
    ShellConnection { cid: String },
}

/// Synchronous lifecycle hook
pub type Hook = Arc<dyn Fn(&Bridge) + Send + Sync>;

/// Everything that defines one model type
#[derive(Clone)]
pub struct ModelSpec {
    pub class_name: String,
    pub handlers: Arc<HandlerTable>,
    pub base: BaseSource,
    pub on_ready: Option<Hook>,
    pub on_close: Option<Hook>,
}

impl ModelSpec {
    pub fn new(class_name: impl Into<String>, handlers: Arc<HandlerTable>, base: BaseSource) -> Self {
        Self {
            class_name: class_name.into(),
            handlers,
            base,
            on_ready: None,
            on_close: None,
        }
    }

    /// A model exposing only the generic operations
    pub fn base_model(base: BaseSource) -> Self {
        Self::new("Base", base_handlers(), base)
    }

    pub fn on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Bridge) + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(hook));
        self
    }

    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Bridge) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }
}

/// Per-instance options
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Which end of the channel this bridge runs on
    pub side: Side,
    /// Model id; a fresh uuid when unset
    pub id: Option<String>,
    /// Closes the bridge when cancelled
    pub session: Option<CancellationToken>,
    /// Dispose the base when the bridge closes
    pub auto_dispose: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            side: Side::Gui,
            id: None,
            session: None,
            auto_dispose: false,
        }
    }
}

impl BridgeOptions {
    /// Options for the kernel end of a channel
    pub fn kernel() -> Self {
        Self {
            side: Side::Kernel,
            ..Self::default()
        }
    }
}

type PendingTx = oneshot::Sender<Result<Value, BridgeError>>;

/// One bridge instance
pub struct Bridge {
    id: String,
    side: Side,
    class_name: String,
    handlers: Arc<HandlerTable>,
    ctx: Arc<BridgeContext>,
    sender: ChannelSender,
    state: watch::Sender<BridgeState>,
    base: RwLock<Option<ObjectRef>>,
    base_subscription: Mutex<Option<(Arc<DisposeSignal>, Subscription)>>,
    pending: DashMap<String, PendingTx>,
    closing: AtomicBool,
    auto_dispose: AtomicBool,
    close_token: CancellationToken,
    init_error: RwLock<Option<BridgeError>>,
    on_ready: Option<Hook>,
    on_close: Option<Hook>,
}

impl Bridge {
    /// Create a bridge on `channel` and start serving it
    pub fn spawn(
        spec: ModelSpec,
        channel: Channel,
        ctx: Arc<BridgeContext>,
        options: BridgeOptions,
    ) -> Arc<Self> {
        let (sender, receiver) = channel.into_parts();
        let (state, _) = watch::channel(BridgeState::Initializing);
        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let bridge = Arc::new(Self {
            id,
            side: options.side,
            class_name: spec.class_name,
            handlers: spec.handlers,
            ctx,
            sender,
            state,
            base: RwLock::new(None),
            base_subscription: Mutex::new(None),
            pending: DashMap::new(),
            closing: AtomicBool::new(false),
            auto_dispose: AtomicBool::new(options.auto_dispose),
            close_token: CancellationToken::new(),
            init_error: RwLock::new(None),
            on_ready: spec.on_ready,
            on_close: spec.on_close,
        });

        bridge.ctx.models.insert(bridge.id.clone(), &bridge);
        tracing::debug!(
            "Spawned {} bridge {} on the {} side",
            bridge.class_name,
            bridge.id,
            bridge.side
        );

        tokio::spawn(bridge.clone().run(spec.base, receiver, options.session));
        bridge
    }

    async fn run(
        self: Arc<Self>,
        base: BaseSource,
        mut receiver: mpsc::UnboundedReceiver<Envelope>,
        session: Option<CancellationToken>,
    ) {
        let session = session.unwrap_or_default();
        let mut backlog = Vec::new();

        let resolved = {
            let resolve = self.resolve_base(base);
            tokio::pin!(resolve);
            loop {
                tokio::select! {
                    result = &mut resolve => break Some(result),
                    message = receiver.recv() => match message {
                        Some(Envelope::Closed { error }) => {
                            if let Some(error) = error {
                                tracing::warn!("Peer of {} closed: {}", self.id, error);
                            }
                            self.close(CloseReason::Remote);
                            break None;
                        }
                        Some(envelope) => backlog.push(envelope),
                        None => {
                            self.close(CloseReason::ChannelLost);
                            break None;
                        }
                    },
                    _ = self.close_token.cancelled() => break None,
                    _ = session.cancelled() => {
                        self.close(CloseReason::SessionEnded);
                        break None;
                    }
                }
            }
        };

        match resolved {
            None => return,
            Some(Err(e)) => {
                tracing::warn!(
                    "Failed to initialize {} bridge {}: {}",
                    self.class_name,
                    self.id,
                    e
                );
                if let Ok(mut slot) = self.init_error.write() {
                    *slot = Some(e.clone());
                }
                let _ = self.sender.send(Envelope::Closed {
                    error: Some(e.to_string()),
                });
                self.close(CloseReason::InitFailed);
                return;
            }
            Some(Ok(base)) => {
                if let Some(base) = base {
                    self.attach_base(base);
                }
                let became_ready = self.state.send_if_modified(|state| {
                    if *state == BridgeState::Initializing {
                        *state = BridgeState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if !became_ready {
                    return;
                }
                tracing::info!("{} bridge {} ready", self.class_name, self.id);

                if let Some(hook) = &self.on_ready {
                    hook(&*self);
                }
                for envelope in backlog {
                    if !self.dispatch(envelope) {
                        return;
                    }
                }
            }
        }

        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(envelope) => {
                        if !self.dispatch(envelope) {
                            break;
                        }
                    }
                    None => {
                        self.close(CloseReason::ChannelLost);
                        break;
                    }
                },
                _ = self.close_token.cancelled() => break,
                _ = session.cancelled() => {
                    self.close(CloseReason::SessionEnded);
                    break;
                }
            }
        }
    }

    async fn resolve_base(&self, source: BaseSource) -> Result<Option<ObjectRef>, BridgeError> {
        let config = &self.ctx.config;
        match source {
            BaseSource::None => Ok(None),
            BaseSource::Object(object) => Ok(Some(object)),
            BaseSource::Path(path) => {
                let anchor = self.ctx.anchor().ok_or(BridgeError::NoBase)?;
                match access::get(&Prop::Object(anchor.clone()), &path, false)? {
                    Prop::Object(object) => Ok(Some(object)),
                    other => Err(BridgeError::invalid_payload(format!(
                        "base path '{}' holds {}",
                        path,
                        other.type_name()
                    ))),
                }
            }
            BaseSource::Connection { cid } => self
                .wait_for_connection(&cid, config.connection_timeout)
                .await
                .map(Some),
            BaseSource::ShellConnection { cid } => {
                let restoration = self.ctx.restoration.clone();
                if tokio::time::timeout(config.restoration_timeout, restoration.wait())
                    .await
                    .is_err()
                {
                    tracing::warn!("Restoration still running, looking for {} anyway", cid);
                }
                self.wait_for_connection(&cid, config.shell_connection_timeout)
                    .await
                    .map(Some)
            }
        }
    }

    async fn wait_for_connection(
        &self,
        cid: &str,
        timeout: std::time::Duration,
    ) -> Result<ObjectRef, BridgeError> {
        match tokio::time::timeout(timeout, self.ctx.registry.wait_for(cid)).await {
            Ok(Some(handle)) => Ok(handle.object().clone()),
            Ok(None) | Err(_) => Err(BridgeError::ConnectionNotFound(cid.to_string())),
        }
    }

    /// Install the base and close when it is disposed
    fn attach_base(self: &Arc<Self>, base: ObjectRef) {
        let signal = self.ctx.registry.signal_of(&base);
        if let Ok(mut slot) = self.base.write() {
            *slot = Some(base);
        }

        let Some(signal) = signal else { return };
        let weak = Arc::downgrade(self);
        let subscription = signal.subscribe(move || {
            if let Some(bridge) = weak.upgrade() {
                // Already disposed; closing must not dispose it again
                bridge.auto_dispose.store(false, Ordering::SeqCst);
                bridge.close(CloseReason::BaseDisposed);
            }
        });

        match subscription {
            Some(subscription) => {
                if let Ok(mut slot) = self.base_subscription.lock() {
                    *slot = Some((signal, subscription));
                }
            }
            None => {
                self.auto_dispose.store(false, Ordering::SeqCst);
                self.close(CloseReason::BaseDisposed);
            }
        }

        // Closed while attaching: release what close could not see
        if self.is_closing() {
            self.release_base();
        }
    }

    /// Route one inbound envelope; `false` once the bridge has closed
    fn dispatch(self: &Arc<Self>, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Response(response) => {
                self.route_response(response);
                true
            }
            Envelope::Request(request) => {
                if request.origin == self.side {
                    tracing::warn!(
                        "Ignoring request {} that uses this side's id key",
                        request.id
                    );
                    return true;
                }
                tracing::debug!(
                    "{} <- {} ({})",
                    self.id,
                    request.operation,
                    request.id
                );
                tokio::spawn(self.clone().handle_request(request));
                true
            }
            Envelope::Closed { error } => {
                if let Some(error) = error {
                    tracing::warn!("Peer of {} closed: {}", self.id, error);
                }
                self.close(CloseReason::Remote);
                false
            }
        }
    }

    fn route_response(&self, response: Response) {
        if response.origin != self.side {
            tracing::warn!("Ignoring response {} for a peer-issued id", response.id);
            return;
        }
        match self.pending.remove(&response.id) {
            Some((_, waiter)) => {
                let result = match response.error {
                    Some(message) => Err(BridgeError::RemoteError(message)),
                    None => Ok(response.payload.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(result);
            }
            None => tracing::warn!("No pending operation for response {}", response.id),
        }
    }

    async fn handle_request(self: Arc<Self>, request: Request) {
        let Request {
            origin,
            id,
            operation,
            payload,
            transform,
        } = request;

        let envelope = match self.perform(&operation, payload, transform.as_ref()).await {
            Ok(value) => Envelope::ok(origin, id, value),
            Err(e) => {
                tracing::error!(
                    "Operation '{}' on {} bridge {} failed: {}",
                    operation,
                    self.class_name,
                    self.id,
                    e
                );
                Envelope::error(origin, id, e.to_string())
            }
        };

        if self.state() == BridgeState::Closed {
            tracing::debug!("Dropping response for '{}' after close", operation);
            return;
        }
        if self.sender.send(envelope).is_err() {
            tracing::debug!("Channel of {} gone before response was sent", self.id);
        }
    }

    /// Run an inbound request end to end: substitution, dispatch, transform
    pub async fn perform(
        self: &Arc<Self>,
        operation: &str,
        payload: Value,
        transform: Option<&Value>,
    ) -> Result<Value, BridgeError> {
        let transform = Transform::from_value(transform)?;
        let payload = self.substitute(Prop::from(payload))?;
        let result = self.operation(operation, payload).await?;
        transform.apply(result, self.ctx.transform_context()).await
    }

    /// Dispatch an operation through the handler table
    pub async fn operation(self: &Arc<Self>, operation: &str, payload: Prop) -> Result<Prop, BridgeError> {
        let handler = self
            .handlers
            .find(operation)
            .ok_or_else(|| BridgeError::UnimplementedOperation(operation.to_string()))?;
        handler(self.clone(), payload).await
    }

    /// Replace identifiers at the paths listed under `toObject` with objects
    fn substitute(&self, payload: Prop) -> Result<Prop, BridgeError> {
        let paths: Vec<String> = match payload.field(SUBSTITUTE_KEY) {
            Some(Prop::List(items)) => items
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect(),
            Some(Prop::String(path)) => vec![path],
            _ => return Ok(payload),
        };

        let mut payload = payload;
        if let Prop::Map(map) = &mut payload {
            map.remove(SUBSTITUTE_KEY);
        }

        for path in paths {
            let value = access::get(&payload, &path, false)?;
            let object = match value {
                Prop::Object(_) => continue,
                Prop::String(id) => self.lookup_object(&id)?,
                Prop::Map(_) => {
                    let cid = value.opt_str_field("cid").ok_or_else(|| {
                        BridgeError::invalid_payload(format!("'{}' is not an object reference", path))
                    })?;
                    self.lookup_object(&cid)?
                }
                other => {
                    return Err(BridgeError::invalid_payload(format!(
                        "'{}' is {}, expected an object id",
                        path,
                        other.type_name()
                    )))
                }
            };
            access::set(&mut payload, &path, Prop::Object(object))?;
        }
        Ok(payload)
    }

    /// Resolve an id as a connection id first, then as a model id
    fn lookup_object(&self, id: &str) -> Result<ObjectRef, BridgeError> {
        if let Some(object) = self.ctx.registry.lookup(id) {
            return Ok(object);
        }
        self.ctx
            .models
            .get(id)
            .and_then(|model| model.base())
            .ok_or_else(|| BridgeError::ConnectionNotFound(id.to_string()))
    }

    /// Ask the peer to perform an operation and await its result
    pub async fn schedule_operation(
        &self,
        operation: &str,
        payload: Prop,
        transform: Transform,
    ) -> Result<Prop, BridgeError> {
        if self.is_closing() {
            return Err(BridgeError::closed());
        }

        let payload = wire::to_wire(&payload, &self.ctx.registry)?;
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        // Close may have drained the table between the check and the insert
        if self.is_closing() {
            self.pending.remove(&id);
            return Err(BridgeError::closed());
        }

        let envelope = Envelope::request(
            self.side,
            id.clone(),
            operation,
            payload,
            Some(transform.to_value()),
        );
        if let Err(e) = self.sender.send(envelope) {
            self.pending.remove(&id);
            return Err(e);
        }
        tracing::debug!("{} -> {} ({})", self.id, operation, id);

        let value = match rx.await {
            Ok(result) => result?,
            Err(_) => return Err(BridgeError::closed()),
        };
        Ok(transform.resolve(value, &self.ctx.registry))
    }

    /// Close the bridge; later calls do nothing
    pub fn close(&self, reason: CloseReason) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(BridgeState::Closing);
        tracing::info!(
            "Closing {} bridge {} ({:?})",
            self.class_name,
            self.id,
            reason
        );

        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(BridgeError::closed()));
            }
        }

        if reason.notifies_peer() {
            let _ = self.sender.send(Envelope::closed());
        }

        if let Some(hook) = &self.on_close {
            hook(self);
        }

        self.release_base();

        self.state.send_replace(BridgeState::Closed);
        self.close_token.cancel();
        self.ctx.models.remove(&self.id);
    }

    fn release_base(&self) {
        let subscription = self.base_subscription.lock().ok().and_then(|mut s| s.take());
        if let Some((signal, subscription)) = subscription {
            signal.unsubscribe(subscription);
        }

        let base = self.base.write().ok().and_then(|mut b| b.take());
        if let Some(base) = base {
            if self.auto_dispose.load(Ordering::SeqCst) || base.dispose_on_close() {
                tracing::debug!("Disposing base {} of {}", base.class_name(), self.id);
                match self.ctx.registry.signal_of(&base) {
                    Some(signal) => {
                        signal.dispose();
                    }
                    None => {
                        base.dispose();
                    }
                }
            }
        }
    }

    /// Wait until the bridge is ready, or report why it never will be
    pub async fn ready(&self) -> Result<(), BridgeError> {
        let mut state = self.state.subscribe();
        let reached = state
            .wait_for(|s| *s != BridgeState::Initializing)
            .await
            .map(|s| *s)
            .unwrap_or(BridgeState::Closed);

        if reached == BridgeState::Ready {
            return Ok(());
        }
        let init_error = self.init_error.read().ok().and_then(|e| e.clone());
        Err(init_error.unwrap_or_else(BridgeError::closed))
    }

    /// Wait until the bridge has closed
    pub async fn closed(&self) {
        self.close_token.cancelled().await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn ctx(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.handlers
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BridgeState::Ready
    }

    pub fn base(&self) -> Option<ObjectRef> {
        self.base.read().ok().and_then(|b| b.clone())
    }

    /// The base object, or `NoBase`
    pub fn require_base(&self) -> Result<ObjectRef, BridgeError> {
        self.base().ok_or(BridgeError::NoBase)
    }

    pub fn set_auto_dispose(&self, value: bool) {
        self.auto_dispose.store(value, Ordering::SeqCst);
    }

    /// Number of outbound operations awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("class_name", &self.class_name)
            .field("side", &self.side)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::GuiObject;
    use crate::transport::channel_pair;
    use serde_json::json;

    fn ctx() -> Arc<BridgeContext> {
        Arc::new(BridgeContext::default())
    }

    #[tokio::test]
    async fn test_generic_operations_against_base() {
        let base = GuiObject::builder("Panel").prop("title", "Main").build();
        let (gui, mut peer) = channel_pair();
        let bridge = Bridge::spawn(
            ModelSpec::base_model(BaseSource::Object(base.clone())),
            gui,
            ctx(),
            BridgeOptions::default(),
        );
        bridge.ready().await.unwrap();

        peer.sender
            .send(Envelope::request(
                Side::Kernel,
                "k1",
                "getProperty",
                json!({"path": "title"}),
                Some(json!("raw")),
            ))
            .unwrap();
        assert_eq!(
            peer.receiver.recv().await,
            Some(Envelope::ok(Side::Kernel, "k1", json!("Main")))
        );

        peer.sender
            .send(Envelope::request(Side::Kernel, "k2", "bogus", json!({}), None))
            .unwrap();
        match peer.receiver.recv().await {
            Some(Envelope::Response(resp)) => {
                assert_eq!(resp.id, "k2");
                assert_eq!(resp.error.as_deref(), Some("Unimplemented operation: bogus"));
            }
            other => panic!("Wrong envelope: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_before_ready_are_buffered() {
        let ctx = ctx();
        let (gui, mut peer) = channel_pair();
        peer.sender
            .send(Envelope::request(
                Side::Kernel,
                "early",
                "getProperty",
                json!({"path": "x"}),
                None,
            ))
            .unwrap();

        let bridge = Bridge::spawn(
            ModelSpec::base_model(BaseSource::Connection { cid: "later".into() }),
            gui,
            ctx.clone(),
            BridgeOptions::default(),
        );
        tokio::task::yield_now().await;
        assert_eq!(bridge.state(), BridgeState::Initializing);

        let obj = GuiObject::builder("Late").prop("x", 5i64).build();
        ctx.registry.register("later", &obj).unwrap();
        bridge.ready().await.unwrap();

        assert_eq!(
            peer.receiver.recv().await,
            Some(Envelope::ok(Side::Kernel, "early", json!(5)))
        );
    }

    #[tokio::test]
    async fn test_remote_close_is_not_echoed() {
        let (gui, mut peer) = channel_pair();
        let bridge = Bridge::spawn(
            ModelSpec::base_model(BaseSource::None),
            gui,
            ctx(),
            BridgeOptions::default(),
        );
        bridge.ready().await.unwrap();

        peer.sender.send(Envelope::closed()).unwrap();
        bridge.closed().await;
        assert_eq!(bridge.state(), BridgeState::Closed);

        drop(bridge);
        // Only the dropped sender remains; nothing was echoed
        assert!(peer.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_init_failure_sends_error_and_closes() {
        let (gui, mut peer) = channel_pair();
        let bridge = Bridge::spawn(
            ModelSpec::base_model(BaseSource::Path("missing".into())),
            gui,
            ctx(),
            BridgeOptions::default(),
        );

        assert!(matches!(bridge.ready().await, Err(BridgeError::NoBase)));
        match peer.receiver.recv().await {
            Some(Envelope::Closed { error }) => assert!(error.is_some()),
            other => panic!("Wrong envelope: {:?}", other),
        }
        assert_eq!(bridge.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn test_auto_dispose_on_close() {
        let ctx = ctx();
        let base = GuiObject::builder("Widget").disposable().build();
        let (gui, _peer) = channel_pair();
        let bridge = Bridge::spawn(
            ModelSpec::base_model(BaseSource::Object(base.clone())),
            gui,
            ctx,
            BridgeOptions {
                auto_dispose: true,
                ..BridgeOptions::default()
            },
        );
        bridge.ready().await.unwrap();

        bridge.close(CloseReason::Requested);
        assert!(base.is_disposed());
        assert!(bridge.base().is_none());
    }
}
