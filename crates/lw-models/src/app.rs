//! The application object every domain model hangs off

use lw_core::{BridgeError, GuiObject, ObjectRef, Prop};

use crate::{commands, menus, notifications, sessions, shell};

/// Anchor paths of the application parts
pub const COMMANDS_PATH: &str = "commands";
pub const SHELL_PATH: &str = "shell";
pub const NOTIFICATIONS_PATH: &str = "notifications";
pub const SESSIONS_PATH: &str = "sessions";
pub const MENUS_PATH: &str = "menus";

/// Build a fresh application object
pub fn create_app() -> ObjectRef {
    GuiObject::builder("App")
        .prop("name", "labwire")
        .prop(COMMANDS_PATH, commands::create_command_registry())
        .prop(SHELL_PATH, shell::create_shell())
        .prop(NOTIFICATIONS_PATH, notifications::create_notification_manager())
        .prop(SESSIONS_PATH, sessions::create_session_manager())
        .prop(MENUS_PATH, menus::create_main_menu())
        .build()
}

/// Fetch a member that must hold an object
pub(crate) fn child_object(owner: &ObjectRef, name: &str) -> Result<ObjectRef, BridgeError> {
    match owner.get(name) {
        Some(Prop::Object(object)) => Ok(object),
        _ => Err(BridgeError::PropertyNotFound {
            segment: name.to_string(),
            path: name.to_string(),
            detail: format!(" ({} has no such object)", owner.class_name()),
        }),
    }
}
