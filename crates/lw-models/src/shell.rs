//! Shell model: placing widgets in dock areas
//!
//! Widgets added to the shell are marked attached, so ids minted for them
//! afterwards carry the `ShellConnection` class. A disposed widget leaves
//! its area on its own.

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use lw_core::{
    base_handlers, BaseSource, BridgeError, GuiObject, HandlerTable, Method, ModelSpec, ObjectRef,
    ObjectRegistry, Prop,
};

use crate::app::{child_object, SHELL_PATH};

/// Model class name
pub const CLASS: &str = "Shell";

/// Areas a widget can be placed in
pub const AREAS: &[&str] = &["main", "left", "right", "top", "bottom", "header", "menu", "down"];

/// Build an empty shell object
pub fn create_shell() -> ObjectRef {
    let areas = GuiObject::empty("AreaMap");
    for area in AREAS {
        areas.set(*area, Prop::List(Vec::new()));
    }

    GuiObject::builder("Shell")
        .prop("widgets", GuiObject::empty("WidgetMap"))
        .prop("areas", areas)
        .prop("currentWidget", Prop::Null)
        .method(
            "activateById",
            Method::sync(|this, args| {
                let shell = this.as_object().cloned().ok_or(BridgeError::NoBase)?;
                let id = args
                    .first()
                    .and_then(|a| a.as_str().map(str::to_string))
                    .ok_or_else(|| BridgeError::invalid_payload("widget id required"))?;
                Ok(Prop::from(activate(&shell, &id)?))
            }),
        )
        .build()
}

/// Focus a widget; `false` if no widget has that id
pub fn activate(shell: &ObjectRef, id: &str) -> Result<bool, BridgeError> {
    match find_widget(shell, id)? {
        Some(widget) => {
            shell.set("currentWidget", widget);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// The widget currently placed under `id`
pub fn find_widget(shell: &ObjectRef, id: &str) -> Result<Option<ObjectRef>, BridgeError> {
    let widgets = child_object(shell, "widgets")?;
    Ok(widgets
        .get_own(id)
        .and_then(|w| w.as_object().cloned())
        .filter(|w| !w.is_disposed()))
}

/// Place a widget in an area
///
/// The widget keeps its `id` member, or gets a fresh one.
pub fn add_widget(
    shell: &ObjectRef,
    registry: &Arc<ObjectRegistry>,
    widget: &ObjectRef,
    area: &str,
    options: Prop,
) -> Result<String, BridgeError> {
    if !AREAS.contains(&area) {
        return Err(BridgeError::invalid_payload(format!("unknown area '{}'", area)));
    }
    let widgets = child_object(shell, "widgets")?;
    let areas = child_object(shell, "areas")?;

    let id = match widget.get("id").and_then(|id| id.as_str().map(str::to_string)) {
        Some(id) if !id.is_empty() => id,
        _ => {
            let id = format!("widget-{}", Uuid::new_v4());
            widget.set("id", id.clone());
            id
        }
    };

    // Moving a widget takes it out of its previous area
    remove_from_areas(&areas, &id);
    let mut placed = match areas.get_own(area) {
        Some(Prop::List(items)) => items,
        _ => Vec::new(),
    };
    let rank = options.field("rank").and_then(|r| r.as_i64());
    let mode = options.opt_str_field("mode");
    let index = match mode.as_deref() {
        Some("split-left") | Some("tab-before") => 0,
        _ => placed.len(),
    };
    placed.insert(index, Prop::from(id.clone()));
    areas.set(area, Prop::List(placed));

    widgets.set(id.clone(), widget.clone());
    widget.set("area", area);
    if let Some(rank) = rank {
        widget.set("rank", rank);
    }
    widget.set_attached(true);

    let signal = registry.signal_for(widget);
    let weak_shell = Arc::downgrade(shell);
    let weak_widget = Arc::downgrade(widget);
    let widget_id = id.clone();
    signal.subscribe(move || {
        if let Some(widget) = weak_widget.upgrade() {
            widget.set_attached(false);
        }
        if let Some(shell) = weak_shell.upgrade() {
            detach(&shell, &widget_id);
        }
    });

    tracing::debug!("Placed {} in {}", id, area);
    Ok(id)
}

fn remove_from_areas(areas: &ObjectRef, id: &str) {
    for (area, items) in areas.entries() {
        if let Prop::List(items) = items {
            if items.iter().any(|i| i.as_str() == Some(id)) {
                let kept: Vec<Prop> = items.into_iter().filter(|i| i.as_str() != Some(id)).collect();
                areas.set(area, Prop::List(kept));
            }
        }
    }
}

fn detach(shell: &ObjectRef, id: &str) {
    if let Ok(widgets) = child_object(shell, "widgets") {
        widgets.remove(id);
    }
    if let Ok(areas) = child_object(shell, "areas") {
        remove_from_areas(&areas, id);
    }
    let current_id = shell
        .get("currentWidget")
        .and_then(|w| w.field("id"))
        .and_then(|id| id.as_str().map(str::to_string));
    if current_id.as_deref() == Some(id) {
        shell.set("currentWidget", Prop::Null);
    }
}

/// Widget ids per area
pub fn list_areas(shell: &ObjectRef) -> Result<Prop, BridgeError> {
    let areas = child_object(shell, "areas")?;
    Ok(Prop::Map(areas.entries().into_iter().collect()))
}

/// Handler table for the shell model
pub fn handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(CLASS, base_handlers())
                .with("addToShell", |bridge, payload| async move {
                    let shell = bridge.require_base()?;
                    let widget = payload
                        .require("widget")?
                        .as_object()
                        .cloned()
                        .ok_or_else(|| {
                            BridgeError::invalid_payload("widget must reference an object")
                        })?;
                    let area = payload
                        .opt_str_field("area")
                        .unwrap_or_else(|| "main".to_string());
                    let options = payload.field("options").unwrap_or_default();

                    let registry = &bridge.ctx().registry;
                    if let Some(cid) = payload.opt_str_field("cid") {
                        registry.register(&cid, &widget)?;
                    }
                    add_widget(&shell, registry, &widget, &area, options)?;
                    Ok(Prop::Object(widget))
                })
                .with("getWidget", |bridge, payload| async move {
                    let shell = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    Ok(find_widget(&shell, &id)?
                        .map(Prop::Object)
                        .unwrap_or_default())
                })
                .with("activateWidget", |bridge, payload| async move {
                    let shell = bridge.require_base()?;
                    let id = payload.str_field("id")?;
                    Ok(Prop::from(activate(&shell, &id)?))
                })
                .with("listAreas", |bridge, _| async move {
                    list_areas(&bridge.require_base()?)
                })
                .into_shared()
        })
        .clone()
}

/// Model bound to the application shell
pub fn spec() -> ModelSpec {
    ModelSpec::new(CLASS, handlers(), BaseSource::Path(SHELL_PATH.to_string()))
}
