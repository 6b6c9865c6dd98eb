//! Connection models: bridges whose base is a registered object

use std::sync::{Arc, OnceLock};

use lw_protocol::{CONNECTION_CLASS, SHELL_CONNECTION_CLASS};

use crate::access;
use crate::bridge::{base_handlers, BaseSource, HandlerTable, ModelSpec};
use crate::error::BridgeError;
use crate::object::Prop;

/// Path on the anchor object that focuses a widget by id
pub const ACTIVATE_PATH: &str = "shell.activateById";

/// Generic operations plus `dispose`
pub fn connection_handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(CONNECTION_CLASS, base_handlers())
                .with("dispose", |bridge, _| async move {
                    let base = bridge.require_base()?;
                    bridge.ctx().registry.signal_for(&base).dispose();
                    Ok(Prop::Null)
                })
                .into_shared()
        })
        .clone()
}

/// Connection operations plus `activate`
pub fn shell_connection_handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(SHELL_CONNECTION_CLASS, connection_handlers())
                .with("activate", |bridge, _| async move {
                    let base = bridge.require_base()?;
                    let widget_id = base
                        .get("id")
                        .and_then(|id| id.as_str().map(str::to_string))
                        .ok_or_else(|| {
                            BridgeError::invalid_payload(format!(
                                "{} has no id to activate",
                                base.class_name()
                            ))
                        })?;
                    let anchor = bridge.ctx().anchor().cloned().ok_or(BridgeError::NoBase)?;
                    access::execute_method(
                        &Prop::Object(anchor),
                        ACTIVATE_PATH,
                        vec![Prop::from(widget_id)],
                    )
                    .await
                })
                .into_shared()
        })
        .clone()
}

/// Model for a handle to any registered object
pub fn connection_spec(cid: impl Into<String>) -> ModelSpec {
    ModelSpec::new(
        CONNECTION_CLASS,
        connection_handlers(),
        BaseSource::Connection { cid: cid.into() },
    )
}

/// Model for a handle to a widget placed in the shell
pub fn shell_connection_spec(cid: impl Into<String>) -> ModelSpec {
    ModelSpec::new(
        SHELL_CONNECTION_CLASS,
        shell_connection_handlers(),
        BaseSource::ShellConnection { cid: cid.into() },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_chain() {
        let shell = shell_connection_handlers();
        assert!(shell.find("activate").is_some());
        assert!(shell.find("dispose").is_some());
        assert!(shell.find("getProperty").is_some());
        assert!(connection_handlers().find("activate").is_none());
    }

    #[test]
    fn test_specs_use_cid_class() {
        assert_eq!(connection_spec("c").class_name, "Connection");
        assert!(matches!(
            shell_connection_spec("s").base,
            BaseSource::ShellConnection { .. }
        ));
    }
}
