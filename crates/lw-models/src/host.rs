//! Bridge host: creating models on request
//!
//! A host owns the shared [`BridgeContext`] and a [`ModelFactory`]. Bridges
//! are opened either by model class or from a connection id, whose class
//! segment decides the model type.
//!
//! # TCP handshake
//!
//! A kernel connecting over TCP first sends
//! `{correlationId, operation: "open", payload: {model?, cid?}}`. The host
//! answers `{correlationId, payload: {id, model}}` and from then on the
//! stream belongs to the new bridge. A failed open is answered with an error
//! and the stream is dropped.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lw_core::transport::tcp;
use lw_core::{
    connection_spec, shell_connection_spec, BaseSource, Bridge, BridgeConfig, BridgeContext,
    BridgeError, BridgeOptions, Channel, ModelSpec,
};
use lw_protocol::{ConnectionId, Envelope, Side, CONNECTION_CLASS, SHELL_CONNECTION_CLASS};

use crate::dialogs::{self, DialogSurface};
use crate::sessions::{KernelLauncher, LocalKernels};
use crate::{commands, create_app, menus, notifications, sessions, shell};

/// Operation of the first envelope on a host stream
pub const OPEN_OPERATION: &str = "open";

/// What a peer asks a host to create
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model class; taken from `cid` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Connection id for connection models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl ModelRequest {
    /// Request a model by class name
    pub fn model(class_name: impl Into<String>) -> Self {
        Self {
            model: Some(class_name.into()),
            cid: None,
        }
    }

    /// Request the model named by a connection id
    pub fn connection(cid: impl Into<String>) -> Self {
        Self {
            model: None,
            cid: Some(cid.into()),
        }
    }

    /// The model class this request resolves to
    pub fn class_name(&self) -> Result<String, BridgeError> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        let cid = self
            .cid
            .as_deref()
            .ok_or_else(|| BridgeError::invalid_payload("either model or cid is required"))?;
        Ok(ConnectionId::parse(cid)?.class_name().to_string())
    }

    fn require_cid(&self) -> Result<String, BridgeError> {
        self.cid
            .clone()
            .ok_or_else(|| BridgeError::invalid_payload("cid is required"))
    }
}

/// Builds the definition of one model class
pub type ModelConstructor =
    Arc<dyn Fn(&ModelRequest, &BridgeContext) -> Result<ModelSpec, BridgeError> + Send + Sync>;

/// Model constructors keyed by class name
#[derive(Default)]
pub struct ModelFactory {
    constructors: DashMap<String, ModelConstructor>,
}

impl ModelFactory {
    /// A factory that knows no models
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with every built-in model
    pub fn with_defaults(surface: Arc<dyn DialogSurface>) -> Self {
        let factory = Self::new();
        factory.register(commands::CLASS, |_, _| Ok(commands::spec()));
        factory.register(shell::CLASS, |_, _| Ok(shell::spec()));
        factory.register(notifications::CLASS, |_, _| Ok(notifications::spec()));
        let kernels: Arc<dyn KernelLauncher> = Arc::new(LocalKernels::new());
        factory.register(sessions::CLASS, move |_, _| Ok(sessions::spec(kernels.clone())));
        factory.register(menus::CLASS, |_, _| Ok(menus::spec()));
        factory.register(dialogs::CLASS, move |_, _| Ok(dialogs::spec(surface.clone())));
        factory.register("Base", |_, ctx| {
            let base = ctx
                .anchor()
                .cloned()
                .map(BaseSource::Object)
                .unwrap_or_default();
            Ok(ModelSpec::base_model(base))
        });
        factory.register(CONNECTION_CLASS, |request, _| {
            Ok(connection_spec(request.require_cid()?))
        });
        factory.register(SHELL_CONNECTION_CLASS, |request, _| {
            Ok(shell_connection_spec(request.require_cid()?))
        });
        factory
    }

    /// Add or replace the constructor for a class
    pub fn register<F>(&self, class_name: impl Into<String>, constructor: F)
    where
        F: Fn(&ModelRequest, &BridgeContext) -> Result<ModelSpec, BridgeError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(class_name.into(), Arc::new(constructor));
    }

    /// Build the model definition for a request
    pub fn create(&self, request: &ModelRequest, ctx: &BridgeContext) -> Result<ModelSpec, BridgeError> {
        let class_name = request.class_name()?;
        let constructor = self
            .constructors
            .get(&class_name)
            .map(|c| c.clone())
            .ok_or_else(|| BridgeError::UnknownModel(class_name.clone()))?;
        constructor(request, ctx)
    }

    /// Known class names, sorted
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        classes.sort();
        classes
    }
}

/// Creates and tracks GUI-side bridges
pub struct BridgeHost {
    ctx: Arc<BridgeContext>,
    factory: ModelFactory,
}

impl BridgeHost {
    pub fn new(ctx: Arc<BridgeContext>, factory: ModelFactory) -> Self {
        Self { ctx, factory }
    }

    /// Host over a fresh application object with every built-in model
    pub fn with_app(config: BridgeConfig, surface: Arc<dyn DialogSurface>) -> Self {
        let ctx = BridgeContext::new(config).with_anchor(create_app());
        Self::new(Arc::new(ctx), ModelFactory::with_defaults(surface))
    }

    pub fn ctx(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn factory(&self) -> &ModelFactory {
        &self.factory
    }

    /// Open a bridge of the named model class
    pub fn open(&self, class_name: &str, channel: Channel) -> Result<Arc<Bridge>, BridgeError> {
        self.open_with(&ModelRequest::model(class_name), channel, BridgeOptions::default())
    }

    /// Open the model named by a connection id's class segment
    pub fn connect(&self, cid: &str, channel: Channel) -> Result<Arc<Bridge>, BridgeError> {
        ConnectionId::parse(cid)?;
        self.open_with(&ModelRequest::connection(cid), channel, BridgeOptions::default())
    }

    /// Open a bridge for any request with explicit options
    pub fn open_with(
        &self,
        request: &ModelRequest,
        channel: Channel,
        options: BridgeOptions,
    ) -> Result<Arc<Bridge>, BridgeError> {
        let spec = self.factory.create(request, &self.ctx)?;
        tracing::info!("Opening {} bridge", spec.class_name);
        Ok(Bridge::spawn(spec, channel, self.ctx.clone(), options))
    }

    /// Ids of the bridges currently open
    pub fn ids(&self) -> Vec<String> {
        self.ctx.models.ids()
    }

    /// Bind `address` and serve until `shutdown` is cancelled
    pub async fn serve_tcp(self: Arc<Self>, address: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind bridge host to {}", address))?;
        self.serve(listener, shutdown).await
    }

    /// Accept kernel connections on `listener`
    ///
    /// Only loopback peers are accepted. Bridges opened here close with
    /// [`lw_core::CloseReason::SessionEnded`] once `shutdown` is cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        tracing::info!("Bridge host listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Bridge host shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        // Only accept connections from localhost
                        if !peer_addr.ip().is_loopback() {
                            tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                            continue;
                        }

                        let host = Arc::clone(&self);
                        let session = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = host.handle_stream(stream, session).await {
                                tracing::warn!("Bridge client {} failed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept bridge connection: {}", e);
                    }
                },
            }
        }
    }

    async fn handle_stream(&self, stream: TcpStream, session: CancellationToken) -> Result<()> {
        stream.set_nodelay(true).ok();
        let Channel { sender, mut receiver } = tcp::attach(stream, self.ctx.config.max_line_length);

        let first = tokio::time::timeout(self.ctx.config.connection_timeout, receiver.recv())
            .await
            .context("Timed out waiting for the open request")?;
        let request = match first {
            Some(Envelope::Request(request)) if request.operation == OPEN_OPERATION => request,
            Some(other) => anyhow::bail!("Expected an open request, got {:?}", other),
            None => anyhow::bail!("Stream closed before the open request"),
        };

        let opened = serde_json::from_value::<ModelRequest>(request.payload.clone())
            .map_err(|e| BridgeError::invalid_payload(e.to_string()))
            .and_then(|model| Ok((self.factory.create(&model, &self.ctx)?, model)));
        let (spec, model) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                sender.send(Envelope::error(request.origin, request.id, e.to_string()))?;
                anyhow::bail!("Open failed: {}", e);
            }
        };

        let id = Uuid::new_v4().to_string();
        sender.send(Envelope::ok(
            request.origin,
            request.id,
            json!({"id": id, "model": spec.class_name}),
        ))?;
        tracing::info!("Opened {} bridge {} for {:?}", spec.class_name, id, model);

        let options = BridgeOptions {
            side: Side::Gui,
            id: Some(id),
            session: Some(session),
            auto_dispose: false,
        };
        Bridge::spawn(spec, Channel::new(sender, receiver), self.ctx.clone(), options);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::HeadlessDialogs;

    fn host() -> BridgeHost {
        BridgeHost::with_app(BridgeConfig::default(), Arc::new(HeadlessDialogs::new()))
    }

    #[test]
    fn test_request_class_from_cid() {
        let request = ModelRequest::connection("labwire-ShellConnection|1");
        assert_eq!(request.class_name().unwrap(), "ShellConnection");
        assert_eq!(
            ModelRequest::model("Shell").class_name().unwrap(),
            "Shell"
        );
        assert!(ModelRequest::default().class_name().is_err());
        assert!(ModelRequest::connection("nope").class_name().is_err());
    }

    #[test]
    fn test_default_factory_classes() {
        let host = host();
        let classes = host.factory().classes();
        for class in [
            "Base",
            "Commands",
            "Connection",
            "Dialogs",
            "Menus",
            "Notifications",
            "Sessions",
            "Shell",
            "ShellConnection",
        ] {
            assert!(classes.contains(&class.to_string()), "{}", class);
        }
    }

    #[test]
    fn test_unknown_model_and_missing_cid() {
        let host = host();
        let ctx = host.ctx().clone();
        assert!(matches!(
            host.factory().create(&ModelRequest::model("Teapot"), &ctx),
            Err(BridgeError::UnknownModel(_))
        ));
        assert!(host
            .factory()
            .create(&ModelRequest::model(CONNECTION_CLASS), &ctx)
            .is_err());
    }

    #[test]
    fn test_open_request_wire_shape() {
        let request = ModelRequest::connection("labwire-Connection|9");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"cid": "labwire-Connection|9"})
        );
    }
}
