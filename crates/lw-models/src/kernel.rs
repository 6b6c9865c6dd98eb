//! Kernel-side peers
//!
//! The kernel end of a channel runs the same bridge engine with no base
//! object. Its handler table holds whatever the GUI may call back into,
//! such as the bodies of commands the kernel registered.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::ToSocketAddrs;
use uuid::Uuid;

use lw_core::transport::tcp;
use lw_core::{BaseSource, Bridge, BridgeContext, BridgeOptions, Channel, HandlerTable, ModelSpec};
use lw_protocol::{Envelope, Side};

use crate::host::{ModelRequest, OPEN_OPERATION};

/// Class name of kernel-side bridges
pub const CLASS: &str = "Kernel";

/// Kernel model serving `handlers`
pub fn kernel_spec(handlers: Arc<HandlerTable>) -> ModelSpec {
    ModelSpec::new(CLASS, handlers, BaseSource::None)
}

/// Open a model on a bridge host and return the kernel end of it
///
/// Returns once the host has accepted the request; the host-side bridge may
/// still be resolving its base.
pub async fn open_remote(
    address: impl ToSocketAddrs,
    request: &ModelRequest,
    spec: ModelSpec,
    ctx: Arc<BridgeContext>,
) -> Result<Arc<Bridge>> {
    let Channel { sender, mut receiver } = tcp::connect(address, ctx.config.max_line_length).await?;

    let open_id = Uuid::new_v4().to_string();
    let payload = serde_json::to_value(request).context("Failed to encode open request")?;
    sender.send(Envelope::request(Side::Kernel, open_id.clone(), OPEN_OPERATION, payload, None))?;

    let reply = tokio::time::timeout(ctx.config.connection_timeout, receiver.recv())
        .await
        .context("Timed out waiting for the bridge host")?;
    let model_id = match reply {
        Some(Envelope::Response(resp)) if resp.id == open_id => {
            if let Some(error) = resp.error {
                bail!("Bridge host refused {:?}: {}", request, error);
            }
            resp.payload
                .as_ref()
                .and_then(|p| p.get("id"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .context("Open reply carries no model id")?
        }
        Some(other) => bail!("Unexpected reply to open: {:?}", other),
        None => bail!("Bridge host closed the stream"),
    };

    tracing::info!("Opened remote model {}", model_id);
    let options = BridgeOptions {
        id: Some(model_id),
        ..BridgeOptions::kernel()
    };
    Ok(Bridge::spawn(spec, Channel::new(sender, receiver), ctx, options))
}
