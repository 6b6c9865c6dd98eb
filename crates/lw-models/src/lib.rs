//! lw-models: Domain models and the bridge host for labwire
//!
//! Each domain model is a handler table chained onto the generic bridge
//! operations, bound to one part of the application object:
//!
//! - [`commands`] - command registry
//! - [`shell`] - widget placement in dock areas
//! - [`notifications`] - toast notifications
//! - [`dialogs`] - modal prompts through a [`dialogs::DialogSurface`]
//! - [`sessions`] - notebook and console sessions over a [`sessions::KernelLauncher`]
//! - [`menus`] - main menu items
//!
//! [`host::BridgeHost`] creates bridges of these types on request, and
//! [`kernel`] holds the kernel-side helpers for reaching a host over TCP.

pub mod app;
pub mod commands;
pub mod dialogs;
pub mod host;
pub mod kernel;
pub mod menus;
pub mod notifications;
pub mod sessions;
pub mod shell;

pub use app::create_app;
pub use dialogs::{DialogOutcome, DialogSurface, HeadlessDialogs};
pub use host::{BridgeHost, ModelFactory, ModelRequest, OPEN_OPERATION};
pub use kernel::{kernel_spec, open_remote};
pub use sessions::{KernelLauncher, LocalKernels};
