//! Notification model
//!
//! Notifications live in the manager's `notifications` map keyed by id.
//! `autoClose` is a delay in milliseconds, or `false` to keep the
//! notification until it is dismissed. Each new `autoClose` replaces the
//! pending timer of that notification.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use uuid::Uuid;

use lw_core::{
    base_handlers, BaseSource, BridgeError, GuiObject, HandlerTable, ModelSpec, ObjectRef, Prop,
};

use crate::app::{child_object, NOTIFICATIONS_PATH};

/// Model class name
pub const CLASS: &str = "Notifications";

/// Hidden member counting auto-close reschedules
const CLOSE_GENERATION: &str = "_closeGeneration";

/// Accepted notification types
pub const TYPES: &[&str] = &["default", "info", "success", "warning", "error", "in-progress"];

/// Build an empty notification manager
pub fn create_notification_manager() -> ObjectRef {
    GuiObject::builder("NotificationManager")
        .prop("notifications", GuiObject::empty("NotificationMap"))
        .build()
}

fn check_type(kind: &str) -> Result<(), BridgeError> {
    if TYPES.contains(&kind) {
        Ok(())
    } else {
        Err(BridgeError::invalid_payload(format!(
            "unknown notification type '{}'",
            kind
        )))
    }
}

/// Parse `autoClose`: a delay in milliseconds or `false`
fn auto_close(value: Option<Prop>) -> Result<Option<Duration>, BridgeError> {
    match value {
        None | Some(Prop::Null) | Some(Prop::Bool(false)) => Ok(None),
        Some(Prop::Number(n)) if n.as_f64().map_or(false, |ms| ms >= 0.0) => {
            Ok(n.as_f64().map(|ms| Duration::from_millis(ms as u64)))
        }
        Some(other) => Err(BridgeError::invalid_payload(format!(
            "autoClose must be a delay or false, got {}",
            other.type_name()
        ))),
    }
}

/// Show a notification and return its id
pub fn notify(
    manager: &ObjectRef,
    message: &str,
    kind: &str,
    close_after: Option<Duration>,
) -> Result<String, BridgeError> {
    check_type(kind)?;
    let notifications = child_object(manager, "notifications")?;
    let id = Uuid::new_v4().to_string();
    let notification = GuiObject::builder("Notification")
        .prop("id", id.clone())
        .prop("message", message)
        .prop("type", kind)
        .build();
    notifications.set(id.clone(), notification.clone());

    if let Some(delay) = close_after {
        schedule_dismiss(&notifications, &notification, &id, delay);
    }
    tracing::debug!("Notification {} ({})", id, kind);
    Ok(id)
}

/// Invalidate any pending timer of `notification` and return the new generation
fn bump_close_generation(notification: &ObjectRef) -> i64 {
    let generation = notification
        .get_own(CLOSE_GENERATION)
        .and_then(|g| g.as_i64())
        .unwrap_or(0)
        + 1;
    notification.set(CLOSE_GENERATION, generation);
    generation
}

fn schedule_dismiss(notifications: &ObjectRef, notification: &ObjectRef, id: &str, delay: Duration) {
    let generation = bump_close_generation(notification);
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No runtime to auto-close notification {}", id);
        return;
    };
    let weak_map = Arc::downgrade(notifications);
    let weak_notification = Arc::downgrade(notification);
    let id = id.to_string();
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        let (Some(notifications), Some(notification)) = (weak_map.upgrade(), weak_notification.upgrade())
        else {
            return;
        };
        let current = notification.get_own(CLOSE_GENERATION).and_then(|g| g.as_i64());
        let shown = matches!(notifications.get_own(&id), Some(Prop::Object(o)) if Arc::ptr_eq(&o, &notification));
        if shown && current == Some(generation) {
            notifications.remove(&id);
        }
    });
}

/// Change a shown notification; `false` if it is gone
pub fn update(manager: &ObjectRef, id: &str, changes: &Prop) -> Result<bool, BridgeError> {
    let notifications = child_object(manager, "notifications")?;
    let Some(Prop::Object(notification)) = notifications.get_own(id) else {
        return Ok(false);
    };

    if let Some(kind) = changes.opt_str_field("type") {
        check_type(&kind)?;
        notification.set("type", kind);
    }
    if let Some(message) = changes.opt_str_field("message") {
        notification.set("message", message);
    }
    if let Some(value) = changes.field("autoClose") {
        match auto_close(Some(value))? {
            Some(delay) => schedule_dismiss(&notifications, &notification, id, delay),
            None => {
                bump_close_generation(&notification);
            }
        }
    }
    Ok(true)
}

/// Dismiss one notification, or all of them without an id
pub fn dismiss(manager: &ObjectRef, id: Option<&str>) -> Result<(), BridgeError> {
    let notifications = child_object(manager, "notifications")?;
    match id {
        Some(id) => {
            notifications.remove(id);
        }
        None => {
            for name in notifications.own_names() {
                notifications.remove(&name);
            }
        }
    }
    Ok(())
}

/// Ids of the notifications currently shown
pub fn active(manager: &ObjectRef) -> Result<Vec<String>, BridgeError> {
    Ok(child_object(manager, "notifications")?.own_names())
}

/// Handler table for the notification model
pub fn handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(CLASS, base_handlers())
                .with("notify", |bridge, payload| async move {
                    let manager = bridge.require_base()?;
                    let message = payload.str_field("message")?;
                    let kind = payload
                        .opt_str_field("type")
                        .unwrap_or_else(|| "default".to_string());
                    let delay = auto_close(payload.field("autoClose"))?;
                    Ok(Prop::from(notify(&manager, &message, &kind, delay)?))
                })
                .with("update", |bridge, payload| async move {
                    let manager = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    Ok(Prop::from(update(&manager, &id, &payload)?))
                })
                .with("dismiss", |bridge, payload| async move {
                    let manager = bridge.require_base()?;
                    dismiss(&manager, payload.opt_str_field("id").as_deref())?;
                    Ok(Prop::Null)
                })
                .into_shared()
        })
        .clone()
}

/// Model bound to the notification manager
pub fn spec() -> ModelSpec {
    ModelSpec::new(
        CLASS,
        handlers(),
        BaseSource::Path(NOTIFICATIONS_PATH.to_string()),
    )
}
