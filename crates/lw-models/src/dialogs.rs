//! Dialog model
//!
//! Dialogs have no base object. Every operation is delegated to a
//! [`DialogSurface`], which the embedding GUI implements.
//! [`HeadlessDialogs`] answers from a script and is what tests use.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use lw_core::{base_handlers, BaseSource, BridgeError, HandlerTable, ModelSpec, Prop};

/// Model class name
pub const CLASS: &str = "Dialogs";

/// A dialog button
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    /// Whether pressing it accepts the dialog
    pub accept: bool,
}

impl Button {
    pub fn ok() -> Self {
        Self {
            label: "Ok".to_string(),
            accept: true,
        }
    }

    pub fn cancel() -> Self {
        Self {
            label: "Cancel".to_string(),
            accept: false,
        }
    }
}

/// What the user did with a dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogOutcome {
    /// The button that closed the dialog
    pub button: Button,
    /// The entered value, `null` when cancelled
    pub value: Value,
}

impl DialogOutcome {
    pub fn accepted(value: Value) -> Self {
        Self {
            button: Button::ok(),
            value,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            button: Button::cancel(),
            value: Value::Null,
        }
    }
}

/// A dialog as it was requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DialogRequest {
    Message {
        title: String,
        body: String,
        buttons: Vec<Button>,
    },
    Boolean {
        title: String,
        label: Option<String>,
    },
    Item {
        title: String,
        items: Vec<String>,
        current: Option<usize>,
    },
    Text {
        title: String,
        text: Option<String>,
    },
    Number {
        title: String,
        value: Option<f64>,
    },
}

/// Something that can show dialogs to the user
#[async_trait]
pub trait DialogSurface: Send + Sync {
    /// Show a message dialog with custom buttons
    async fn show_dialog(
        &self,
        title: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<DialogOutcome, BridgeError>;

    /// Ask a yes/no question
    async fn get_boolean(
        &self,
        title: &str,
        label: Option<&str>,
    ) -> Result<DialogOutcome, BridgeError>;

    /// Pick one of `items`
    async fn get_item(
        &self,
        title: &str,
        items: &[String],
        current: Option<usize>,
    ) -> Result<DialogOutcome, BridgeError>;

    /// Ask for a line of text
    async fn get_text(
        &self,
        title: &str,
        text: Option<&str>,
    ) -> Result<DialogOutcome, BridgeError>;

    /// Ask for a number
    async fn get_number(
        &self,
        title: &str,
        value: Option<f64>,
    ) -> Result<DialogOutcome, BridgeError>;
}

/// Scripted dialog surface
///
/// Answers come from a queue in order; once it is empty every dialog is
/// cancelled. Each request is recorded.
#[derive(Default)]
pub struct HeadlessDialogs {
    script: Mutex<VecDeque<DialogOutcome>>,
    shown: Mutex<Vec<DialogRequest>>,
}

impl HeadlessDialogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface that answers with `outcomes` in order
    pub fn scripted(outcomes: impl IntoIterator<Item = DialogOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            shown: Mutex::default(),
        }
    }

    /// Queue one more answer
    pub async fn push(&self, outcome: DialogOutcome) {
        self.script.lock().await.push_back(outcome);
    }

    /// Every dialog shown so far
    pub async fn shown(&self) -> Vec<DialogRequest> {
        self.shown.lock().await.clone()
    }

    async fn answer(&self, request: DialogRequest) -> Result<DialogOutcome, BridgeError> {
        tracing::debug!("Headless dialog: {:?}", request);
        self.shown.lock().await.push(request);
        Ok(self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(DialogOutcome::cancelled))
    }
}

#[async_trait]
impl DialogSurface for HeadlessDialogs {
    async fn show_dialog(
        &self,
        title: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<DialogOutcome, BridgeError> {
        self.answer(DialogRequest::Message {
            title: title.to_string(),
            body: body.to_string(),
            buttons: buttons.to_vec(),
        })
        .await
    }

    async fn get_boolean(
        &self,
        title: &str,
        label: Option<&str>,
    ) -> Result<DialogOutcome, BridgeError> {
        self.answer(DialogRequest::Boolean {
            title: title.to_string(),
            label: label.map(str::to_string),
        })
        .await
    }

    async fn get_item(
        &self,
        title: &str,
        items: &[String],
        current: Option<usize>,
    ) -> Result<DialogOutcome, BridgeError> {
        self.answer(DialogRequest::Item {
            title: title.to_string(),
            items: items.to_vec(),
            current,
        })
        .await
    }

    async fn get_text(
        &self,
        title: &str,
        text: Option<&str>,
    ) -> Result<DialogOutcome, BridgeError> {
        self.answer(DialogRequest::Text {
            title: title.to_string(),
            text: text.map(str::to_string),
        })
        .await
    }

    async fn get_number(
        &self,
        title: &str,
        value: Option<f64>,
    ) -> Result<DialogOutcome, BridgeError> {
        self.answer(DialogRequest::Number {
            title: title.to_string(),
            value,
        })
        .await
    }
}

/// Buttons are given as labels or as `{label, accept}`
fn parse_buttons(value: Option<Prop>) -> Result<Vec<Button>, BridgeError> {
    let Some(Prop::List(items)) = value else {
        return Ok(vec![Button::cancel(), Button::ok()]);
    };
    items
        .iter()
        .map(|item| match item {
            Prop::String(label) => Ok(Button {
                label: label.clone(),
                accept: true,
            }),
            other => Ok(Button {
                label: other.str_field("label")?,
                accept: other.field("accept").and_then(|a| a.as_bool()).unwrap_or(false),
            }),
        })
        .collect()
}

fn outcome_prop(outcome: DialogOutcome) -> Result<Prop, BridgeError> {
    serde_json::to_value(outcome)
        .map(Prop::from)
        .map_err(|e| BridgeError::invalid_payload(e.to_string()))
}

fn title(payload: &Prop) -> String {
    payload.opt_str_field("title").unwrap_or_default()
}

/// Handler table delegating to `surface`
pub fn handlers(surface: Arc<dyn DialogSurface>) -> Arc<HandlerTable> {
    let show = surface.clone();
    let boolean = surface.clone();
    let item = surface.clone();
    let text = surface.clone();
    let number = surface;

    HandlerTable::extending(CLASS, base_handlers())
        .with("showDialog", move |_, payload| {
            let surface = show.clone();
            async move {
                let body = payload.opt_str_field("body").unwrap_or_default();
                let buttons = parse_buttons(payload.field("buttons"))?;
                outcome_prop(surface.show_dialog(&title(&payload), &body, &buttons).await?)
            }
        })
        .with("getBoolean", move |_, payload| {
            let surface = boolean.clone();
            async move {
                let label = payload.opt_str_field("label");
                outcome_prop(surface.get_boolean(&title(&payload), label.as_deref()).await?)
            }
        })
        .with("getItem", move |_, payload| {
            let surface = item.clone();
            async move {
                let items: Vec<String> = payload
                    .require("items")?
                    .as_list()
                    .ok_or_else(|| BridgeError::invalid_payload("items must be a list"))?
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect();
                let current = payload
                    .field("current")
                    .and_then(|c| c.as_i64())
                    .and_then(|c| usize::try_from(c).ok());
                outcome_prop(surface.get_item(&title(&payload), &items, current).await?)
            }
        })
        .with("getText", move |_, payload| {
            let surface = text.clone();
            async move {
                let initial = payload.opt_str_field("text");
                outcome_prop(surface.get_text(&title(&payload), initial.as_deref()).await?)
            }
        })
        .with("getNumber", move |_, payload| {
            let surface = number.clone();
            async move {
                let value = payload.field("value").and_then(|v| v.as_f64());
                outcome_prop(surface.get_number(&title(&payload), value).await?)
            }
        })
        .into_shared()
}

/// Dialog model; it has no base object
pub fn spec(surface: Arc<dyn DialogSurface>) -> ModelSpec {
    ModelSpec::new(CLASS, handlers(surface), BaseSource::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_headless_answers_in_order_then_cancels() {
        let dialogs = HeadlessDialogs::scripted([DialogOutcome::accepted(json!(true))]);
        let first = dialogs.get_boolean("Proceed?", None).await.unwrap();
        assert!(first.button.accept);
        assert_eq!(first.value, json!(true));

        let second = dialogs.get_text("Name", Some("x")).await.unwrap();
        assert_eq!(second, DialogOutcome::cancelled());

        let shown = dialogs.shown().await;
        assert_eq!(shown.len(), 2);
        assert!(matches!(&shown[1], DialogRequest::Text { text: Some(t), .. } if t == "x"));
    }

    #[test]
    fn test_parse_buttons() {
        let buttons = parse_buttons(Some(Prop::from(json!([
            "Save",
            {"label": "Discard", "accept": false}
        ]))))
        .unwrap();
        assert_eq!(buttons[0], Button { label: "Save".into(), accept: true });
        assert_eq!(buttons[1], Button { label: "Discard".into(), accept: false });
        assert_eq!(parse_buttons(None).unwrap().len(), 2);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let prop = outcome_prop(DialogOutcome::accepted(json!("b"))).unwrap();
        assert_eq!(
            prop,
            Prop::from(json!({"button": {"label": "Ok", "accept": true}, "value": "b"}))
        );
    }
}
