//! Command registry model
//!
//! Operations:
//! - `execute {id, args?}` runs a command and returns its result
//! - `addCommand {id, label?, caption?}` adds a command whose body runs on
//!   the kernel through a reverse `execute` request
//! - `removeCommand {id}`
//! - `listCommands`
//!
//! Commands added through a bridge are disposed when that bridge closes.

use std::sync::{Arc, OnceLock};

use lw_core::{
    base_handlers, BaseSource, Bridge, BridgeError, GuiObject, HandlerTable, Method, ModelSpec,
    ObjectRef, Prop, Transform,
};

use crate::app::{child_object, COMMANDS_PATH};

/// Model class name
pub const CLASS: &str = "Commands";

/// Build an empty command registry object
pub fn create_command_registry() -> ObjectRef {
    GuiObject::builder("CommandRegistry")
        .prop("commands", GuiObject::empty("CommandMap"))
        .method(
            "execute",
            Method::new(|this, args| async move {
                let mut args = args.into_iter();
                let id = args
                    .next()
                    .and_then(|id| id.as_str().map(str::to_string))
                    .ok_or_else(|| BridgeError::invalid_payload("command id required"))?;
                let registry = this
                    .as_object()
                    .cloned()
                    .ok_or(BridgeError::NoBase)?;
                let command = find_command(&registry, &id)?;
                command.invoke("execute", vec![args.next().unwrap_or_default()]).await
            }),
        )
        .method(
            "hasCommand",
            Method::sync(|this, args| {
                let registry = this.as_object().cloned().ok_or(BridgeError::NoBase)?;
                let id = args.first().and_then(|a| a.as_str()).unwrap_or_default();
                Ok(Prop::from(find_command(&registry, id).is_ok()))
            }),
        )
        .method(
            "listCommands",
            Method::sync(|this, _| {
                let registry = this.as_object().cloned().ok_or(BridgeError::NoBase)?;
                Ok(Prop::List(
                    list_commands(&registry)?.into_iter().map(Prop::from).collect(),
                ))
            }),
        )
        .build()
}

fn find_command(registry: &ObjectRef, id: &str) -> Result<ObjectRef, BridgeError> {
    let commands = child_object(registry, "commands")?;
    match commands.get_own(id) {
        Some(Prop::Object(command)) if !command.is_disposed() => Ok(command),
        _ => Err(BridgeError::invalid_payload(format!("unknown command '{}'", id))),
    }
}

/// Sorted ids of every registered command
pub fn list_commands(registry: &ObjectRef) -> Result<Vec<String>, BridgeError> {
    Ok(child_object(registry, "commands")?.own_names())
}

/// Register a command; disposing the returned object removes it
pub fn add_command(
    registry: &ObjectRef,
    id: &str,
    label: &str,
    caption: Option<&str>,
    body: Method,
) -> Result<ObjectRef, BridgeError> {
    let commands = child_object(registry, "commands")?;
    if find_command(registry, id).is_ok() {
        return Err(BridgeError::RegistrationConflict(format!("command '{}'", id)));
    }

    let command = GuiObject::builder("Command")
        .prop("id", id)
        .prop("label", label)
        .prop("caption", caption.unwrap_or_default())
        .prop("isEnabled", true)
        .method("execute", body)
        .disposable()
        .build();
    commands.set(id, command.clone());

    if let Some(signal) = command.signal() {
        let weak_map = Arc::downgrade(&commands);
        let weak_command = Arc::downgrade(&command);
        let id = id.to_string();
        signal.subscribe(move || {
            let (Some(map), Some(command)) = (weak_map.upgrade(), weak_command.upgrade()) else {
                return;
            };
            // Only remove the entry if it still points at this command
            if let Some(Prop::Object(current)) = map.get_own(&id) {
                if Arc::ptr_eq(&current, &command) {
                    map.remove(&id);
                }
            }
        });
    }

    tracing::debug!("Added command {}", id);
    Ok(command)
}

/// Command body that forwards to the kernel behind `bridge`
fn remote_body(bridge: &Arc<Bridge>, id: &str) -> Method {
    let weak = Arc::downgrade(bridge);
    let id = id.to_string();
    Method::new(move |_, args| {
        let weak = weak.clone();
        let id = id.clone();
        async move {
            let bridge = weak.upgrade().ok_or_else(BridgeError::closed)?;
            let payload = Prop::map([
                ("id", Prop::from(id)),
                ("args", args.into_iter().next().unwrap_or_default()),
            ]);
            bridge
                .schedule_operation("execute", payload, Transform::Auto)
                .await
        }
    })
}

fn dispose_owned(bridge: &Bridge) {
    let Some(registry) = bridge.base() else { return };
    let Ok(commands) = child_object(&registry, "commands") else {
        return;
    };
    for (_, command) in commands.entries() {
        if let Prop::Object(command) = command {
            if command.get_own("owner").as_ref().and_then(Prop::as_str) == Some(bridge.id()) {
                command.dispose();
            }
        }
    }
}

/// Handler table for the command model
pub fn handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(CLASS, base_handlers())
                .with("execute", |bridge, payload| async move {
                    let registry = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    let args = payload.field("args").unwrap_or_default();
                    registry
                        .invoke("execute", vec![Prop::from(id), args])
                        .await
                })
                .with("addCommand", |bridge, payload| async move {
                    let registry = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    let label = payload.opt_str_field("label").unwrap_or_else(|| id.clone());
                    let caption = payload.opt_str_field("caption");

                    let command = add_command(
                        &registry,
                        &id,
                        &label,
                        caption.as_deref(),
                        remote_body(&bridge, &id),
                    )?;
                    command.set("owner", bridge.id());
                    Ok(Prop::Object(command))
                })
                .with("removeCommand", |bridge, payload| async move {
                    let registry = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    find_command(&registry, &id)?.dispose();
                    Ok(Prop::Null)
                })
                .with("listCommands", |bridge, _| async move {
                    let registry = bridge.require_base()?;
                    Ok(Prop::List(
                        list_commands(&registry)?
                            .into_iter()
                            .map(Prop::from)
                            .collect(),
                    ))
                })
                .into_shared()
        })
        .clone()
}

/// Model bound to the application's command registry
pub fn spec() -> ModelSpec {
    ModelSpec::new(CLASS, handlers(), BaseSource::Path(COMMANDS_PATH.to_string()))
        .on_close(dispose_owned)
}
