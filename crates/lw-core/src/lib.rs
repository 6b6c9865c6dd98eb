//! lw-core: Bridge engine for labwire
//!
//! This crate holds everything that sits between a message channel and the
//! GUI-side objects a kernel wants to drive: the dynamic object model, the
//! nested-path accessor, the introspector, the connection registry, the
//! transform pipeline and the bridge instance that correlates requests and
//! responses in both directions.

pub mod access;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod introspect;
pub mod logging;
pub mod object;
pub mod registry;
pub mod transform;
pub mod transport;
pub mod wire;

pub use bridge::{
    base_handlers, BaseSource, Bridge, BridgeOptions, BridgeState, CloseReason, HandlerTable,
    ModelSpec,
};
pub use config::BridgeConfig;
pub use connection::{connection_spec, shell_connection_spec};
pub use context::{BridgeContext, ModelTable, NamedLocks, Restoration};
pub use error::{BridgeError, ConfigError};
pub use object::{Disposable, DisposeSignal, GuiObject, Method, ObjectRef, Prop};
pub use registry::ObjectRegistry;
pub use transform::{FunctionTable, Transform, TransformContext};
pub use transport::{channel_pair, Channel, ChannelSender};
