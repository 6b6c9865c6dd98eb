//! Main menu model

use std::sync::{Arc, OnceLock};

use lw_core::{
    base_handlers, BaseSource, BridgeError, GuiObject, HandlerTable, ModelSpec, ObjectRef, Prop,
};

use crate::app::{child_object, COMMANDS_PATH, MENUS_PATH};
use crate::commands;

/// Model class name
pub const CLASS: &str = "Menus";

/// Menus of the main menu bar
pub const MENUS: &[&str] = &["file", "edit", "view", "run", "kernel", "tabs", "settings", "help"];

/// Rank given to items added without one
pub const DEFAULT_RANK: i64 = 500;

/// Build the main menu with every menu empty
pub fn create_main_menu() -> ObjectRef {
    let menus = GuiObject::empty("MenuMap");
    for menu in MENUS {
        menus.set(*menu, Prop::List(Vec::new()));
    }
    GuiObject::builder("MainMenu").prop("menus", menus).build()
}

fn items_of(menus: &ObjectRef, menu: &str) -> Result<Vec<Prop>, BridgeError> {
    match menus.get_own(menu) {
        Some(Prop::List(items)) => Ok(items),
        _ => Err(BridgeError::invalid_payload(format!("unknown menu '{}'", menu))),
    }
}

fn rank_of(item: &Prop) -> i64 {
    item.field("rank").and_then(|r| r.as_i64()).unwrap_or(DEFAULT_RANK)
}

/// Add a command to a menu, keeping items ordered by rank
pub fn add_item(
    main_menu: &ObjectRef,
    menu: &str,
    command: &str,
    rank: Option<i64>,
) -> Result<(), BridgeError> {
    let menus = child_object(main_menu, "menus")?;
    let mut items = items_of(&menus, menu)?;
    if items.iter().any(|i| i.opt_str_field("command").as_deref() == Some(command)) {
        return Err(BridgeError::RegistrationConflict(format!(
            "'{}' is already in the {} menu",
            command, menu
        )));
    }

    let rank = rank.unwrap_or(DEFAULT_RANK);
    // Equal ranks keep insertion order
    let index = items.iter().position(|i| rank_of(i) > rank).unwrap_or(items.len());
    items.insert(
        index,
        Prop::map([("command", Prop::from(command)), ("rank", Prop::from(rank))]),
    );
    menus.set(menu, Prop::List(items));
    Ok(())
}

/// Remove a command from a menu; `false` if it was not there
pub fn remove_item(main_menu: &ObjectRef, menu: &str, command: &str) -> Result<bool, BridgeError> {
    let menus = child_object(main_menu, "menus")?;
    let items = items_of(&menus, menu)?;
    let before = items.len();
    let kept: Vec<Prop> = items
        .into_iter()
        .filter(|i| i.opt_str_field("command").as_deref() != Some(command))
        .collect();
    let removed = kept.len() != before;
    menus.set(menu, Prop::List(kept));
    Ok(removed)
}

/// Items of a menu in display order
pub fn list_items(main_menu: &ObjectRef, menu: &str) -> Result<Vec<Prop>, BridgeError> {
    items_of(&child_object(main_menu, "menus")?, menu)
}

/// Handler table for the menu model
pub fn handlers() -> Arc<HandlerTable> {
    static TABLE: OnceLock<Arc<HandlerTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HandlerTable::extending(CLASS, base_handlers())
                .with("addItem", |bridge, payload| async move {
                    let main_menu = bridge.require_base()?;
                    let menu = payload.str_field("menu")?;
                    let command = payload.str_field("command")?;
                    let rank = payload.field("rank").and_then(|r| r.as_i64());

                    if let Some(anchor) = bridge.ctx().anchor() {
                        let registry = child_object(anchor, COMMANDS_PATH)?;
                        if !commands::list_commands(&registry)?.contains(&command) {
                            return Err(BridgeError::invalid_payload(format!(
                                "unknown command '{}'",
                                command
                            )));
                        }
                    }
                    add_item(&main_menu, &menu, &command, rank)?;
                    Ok(Prop::Null)
                })
                .with("removeItem", |bridge, payload| async move {
                    let main_menu = bridge.require_base()?;
                    let menu = payload.str_field("menu")?;
                    let command = payload.str_field("command")?;
                    Ok(Prop::from(remove_item(&main_menu, &menu, &command)?))
                })
                .with("listItems", |bridge, payload| async move {
                    let main_menu = bridge.require_base()?;
                    let menu = payload.str_field("menu")?;
                    Ok(Prop::List(list_items(&main_menu, &menu)?))
                })
                .into_shared()
        })
        .clone()
}

/// Model bound to the main menu
pub fn spec() -> ModelSpec {
    ModelSpec::new(CLASS, handlers(), BaseSource::Path(MENUS_PATH.to_string()))
}
