//! End-to-end tests for the domain models
//!
//! A host over a fresh application object serves each model; a kernel-side
//! bridge drives it the way kernel code would.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use lw_core::{
    channel_pair, Bridge, BridgeConfig, BridgeContext, BridgeError, BridgeOptions, BridgeState,
    CloseReason, GuiObject, HandlerTable, Method, ObjectRef, Prop, Transform,
};
use lw_models::app::{COMMANDS_PATH, NOTIFICATIONS_PATH, SHELL_PATH};
use lw_models::{
    commands, kernel_spec, notifications, open_remote, sessions, shell, BridgeHost,
    DialogOutcome, HeadlessDialogs, KernelLauncher, ModelRequest,
};

fn host_with(dialogs: HeadlessDialogs) -> BridgeHost {
    BridgeHost::with_app(BridgeConfig::default(), Arc::new(dialogs))
}

fn host() -> BridgeHost {
    host_with(HeadlessDialogs::new())
}

/// Kernel handlers that run command bodies on request
fn kernel_handlers() -> Arc<HandlerTable> {
    HandlerTable::new("Kernel")
        .with("execute", |_, payload| async move {
            let id = payload.str_field("id")?;
            let x = payload
                .field("args")
                .and_then(|a| a.field("x"))
                .and_then(|x| x.as_i64())
                .unwrap_or_default();
            Ok(Prop::from(format!("kernel ran {} with {}", id, x)))
        })
        .into_shared()
}

/// Open `class` on the host and a kernel bridge on the other end
async fn open(host: &BridgeHost, class: &str) -> (Arc<Bridge>, Arc<Bridge>) {
    let (gui_end, kernel_end) = channel_pair();
    let gui = host.open(class, gui_end).expect("model should open");
    let kernel = Bridge::spawn(
        kernel_spec(kernel_handlers()),
        kernel_end,
        Arc::new(BridgeContext::default()),
        BridgeOptions::kernel(),
    );
    gui.ready().await.expect("gui bridge failed to start");
    kernel.ready().await.expect("kernel bridge failed to start");
    (gui, kernel)
}

fn part(host: &BridgeHost, path: &str) -> ObjectRef {
    host.ctx()
        .anchor()
        .and_then(|app| app.get(path))
        .and_then(|p| p.as_object().cloned())
        .expect("application part missing")
}

#[tokio::test]
async fn test_kernel_executes_local_command() {
    let host = host();
    commands::add_command(
        &part(&host, COMMANDS_PATH),
        "my-command",
        "Mine",
        None,
        Method::sync(|_, args| {
            assert_eq!(args[0].field("x"), Some(Prop::from(1i64)));
            Ok(Prop::from("done"))
        }),
    )
    .unwrap();

    let (_gui, kernel) = open(&host, commands::CLASS).await;
    let result = kernel
        .schedule_operation(
            "execute",
            Prop::from(json!({"id": "my-command", "args": {"x": 1}})),
            Transform::Raw,
        )
        .await
        .unwrap();
    assert_eq!(result, Prop::from("done"));
}

#[tokio::test]
async fn test_kernel_command_runs_on_kernel_and_goes_away_on_close() {
    let host = host();
    let registry = part(&host, COMMANDS_PATH);
    let (gui, kernel) = open(&host, commands::CLASS).await;

    let handle = kernel
        .schedule_operation(
            "addCommand",
            Prop::from(json!({"id": "k-cmd", "label": "From kernel"})),
            Transform::Auto,
        )
        .await
        .unwrap();
    assert!(handle.opt_str_field("cid").is_some());
    assert_eq!(commands::list_commands(&registry).unwrap(), vec!["k-cmd"]);

    // Running it from the GUI calls back into the kernel
    let out = registry
        .invoke(
            "execute",
            vec![Prop::from("k-cmd"), Prop::from(json!({"x": 7}))],
        )
        .await
        .unwrap();
    assert_eq!(out, Prop::from("kernel ran k-cmd with 7"));

    kernel.close(CloseReason::Requested);
    timeout(Duration::from_secs(1), gui.closed())
        .await
        .expect("gui bridge did not close");
    assert!(commands::list_commands(&registry).unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_command_error_reaches_kernel() {
    let host = host();
    let (_gui, kernel) = open(&host, commands::CLASS).await;
    let add = Prop::from(json!({"id": "twice"}));

    kernel
        .schedule_operation("addCommand", add.clone(), Transform::Null)
        .await
        .unwrap();
    let err = kernel
        .schedule_operation("addCommand", add, Transform::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::RemoteError(msg) if msg.contains("twice")));
}

#[tokio::test]
async fn test_add_to_shell_and_activate_through_shell_connection() {
    let host = host();
    let shell_object = part(&host, SHELL_PATH);
    let registry = host.ctx().registry.clone();

    let panel = GuiObject::builder("Panel").prop("id", "panel-1").build();
    registry.register("labwire-Connection|panel", &panel).unwrap();

    let (_gui, kernel) = open(&host, shell::CLASS).await;
    kernel
        .schedule_operation(
            "addToShell",
            Prop::from(json!({
                "widget": {"cid": "labwire-Connection|panel"},
                "toObject": ["widget"],
                "area": "left"
            })),
            Transform::Null,
        )
        .await
        .unwrap();
    assert!(panel.is_attached());
    let areas = shell::list_areas(&shell_object).unwrap();
    assert_eq!(areas.field("left"), Some(Prop::from(json!(["panel-1"]))));

    // Widgets placed after attachment get shell connection ids
    let editor = GuiObject::builder("Editor").prop("id", "editor-1").build();
    shell::add_widget(&shell_object, &registry, &editor, "main", Prop::Null).unwrap();
    let cid = registry.get_or_assign_id(&editor, true).unwrap().unwrap();
    assert!(cid.starts_with("labwire-ShellConnection|"));

    let (gui_end, kernel_end) = channel_pair();
    let connection = host.connect(&cid, gui_end).unwrap();
    assert_eq!(connection.class_name(), "ShellConnection");
    let handle = Bridge::spawn(
        kernel_spec(kernel_handlers()),
        kernel_end,
        Arc::new(BridgeContext::default()),
        BridgeOptions::kernel(),
    );
    connection.ready().await.unwrap();

    let activated = handle
        .schedule_operation("activate", Prop::Null, Transform::Raw)
        .await
        .unwrap();
    assert_eq!(activated, Prop::from(true));
    match shell_object.get("currentWidget") {
        Some(Prop::Object(current)) => assert!(Arc::ptr_eq(&current, &editor)),
        other => panic!("Wrong current widget: {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_picks_model_from_cid() {
    let host = host();
    let (gui_end, _kernel_end) = channel_pair();
    assert!(matches!(
        host.connect("labwire-Teapot|1", gui_end),
        Err(BridgeError::UnknownModel(class)) if class == "Teapot"
    ));

    let (gui_end, _kernel_end) = channel_pair();
    assert!(matches!(
        host.connect("not-a-cid", gui_end),
        Err(BridgeError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_notifications_over_the_wire() {
    let host = host();
    let manager = part(&host, NOTIFICATIONS_PATH);
    let (_gui, kernel) = open(&host, notifications::CLASS).await;

    let id = kernel
        .schedule_operation(
            "notify",
            Prop::from(json!({"message": "Saved", "type": "success", "autoClose": false})),
            Transform::Raw,
        )
        .await
        .unwrap();
    let id = id.as_str().unwrap().to_string();
    assert_eq!(notifications::active(&manager).unwrap(), vec![id.clone()]);

    let updated = kernel
        .schedule_operation(
            "update",
            Prop::from(json!({"id": id, "message": "Saved again"})),
            Transform::Raw,
        )
        .await
        .unwrap();
    assert_eq!(updated, Prop::from(true));

    let bad = kernel
        .schedule_operation(
            "notify",
            Prop::from(json!({"message": "x", "type": "loud"})),
            Transform::Raw,
        )
        .await;
    assert!(bad.is_err());

    kernel
        .schedule_operation("dismiss", Prop::from(json!({})), Transform::Null)
        .await
        .unwrap();
    assert!(notifications::active(&manager).unwrap().is_empty());
}

#[tokio::test]
async fn test_dialogs_answer_from_surface() {
    let dialogs = HeadlessDialogs::scripted([DialogOutcome::accepted(json!("blue"))]);
    let host = host_with(dialogs);
    let (gui, kernel) = open(&host, "Dialogs").await;
    assert!(gui.base().is_none());

    let picked = kernel
        .schedule_operation(
            "getItem",
            Prop::from(json!({"title": "Colour", "items": ["red", "blue"]})),
            Transform::Raw,
        )
        .await
        .unwrap();
    assert_eq!(picked.field("value"), Some(Prop::from("blue")));

    // The script is spent, so the next dialog is cancelled
    let asked = kernel
        .schedule_operation(
            "getBoolean",
            Prop::from(json!({"title": "Sure?"})),
            Transform::Raw,
        )
        .await
        .unwrap();
    assert_eq!(
        asked.field("button").and_then(|b| b.field("accept")),
        Some(Prop::from(false))
    );
}

#[tokio::test]
async fn test_session_sequences_hold_the_model_lock() {
    let host = host();
    let (gui, kernel) = open(&host, sessions::CLASS).await;

    let guard = host.ctx().locks.lock(gui.id()).await;
    let k = kernel.clone();
    let started = tokio::spawn(async move {
        k.schedule_operation(
            "newSession",
            Prop::from(json!({"path": "analysis.ipynb"})),
            Transform::Raw,
        )
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!started.is_finished());

    drop(guard);
    let session = started.await.unwrap().unwrap();
    let session_cid = session.str_field("cid").unwrap();

    let listed = kernel
        .schedule_operation("listSessions", Prop::Null, Transform::Raw)
        .await
        .unwrap();
    let listed = listed.as_list().unwrap().to_vec();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].field("kernelName"), Some(Prop::from("python3")));
    let id = listed[0].str_field("id").unwrap();

    let stopped = kernel
        .schedule_operation("shutdown", Prop::from(json!({"id": id})), Transform::Raw)
        .await
        .unwrap();
    assert_eq!(stopped, Prop::from(true));
    assert!(host.ctx().registry.lookup(&session_cid).is_none());
}

/// Launcher whose first start blocks until released
#[derive(Default)]
struct SlowKernels {
    launching: tokio::sync::Notify,
    release: tokio::sync::Notify,
    log: std::sync::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl KernelLauncher for SlowKernels {
    async fn start(&self, kernel_name: &str) -> Result<String, BridgeError> {
        self.launching.notify_one();
        self.release.notified().await;
        self.log.lock().unwrap().push(format!("start {}", kernel_name));
        Ok("kernel-1".to_string())
    }

    async fn stop(&self, kernel_id: &str) -> Result<(), BridgeError> {
        self.log.lock().unwrap().push(format!("stop {}", kernel_id));
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_waits_for_a_starting_session() {
    let host = host();
    let kernels = Arc::new(SlowKernels::default());
    let launcher: Arc<dyn KernelLauncher> = kernels.clone();
    host.factory().register(sessions::CLASS, move |_, _| {
        Ok(sessions::spec(launcher.clone()))
    });
    let (_gui, kernel) = open(&host, sessions::CLASS).await;

    let k = kernel.clone();
    let started = tokio::spawn(async move {
        k.schedule_operation(
            "newSession",
            Prop::from(json!({"path": "slow.ipynb", "kernelName": "julia"})),
            Transform::Raw,
        )
        .await
    });
    kernels.launching.notified().await;

    let listed = kernel
        .schedule_operation("listSessions", Prop::Null, Transform::Raw)
        .await
        .unwrap();
    let listed = listed.as_list().unwrap().to_vec();
    assert_eq!(listed[0].field("status"), Some(Prop::from("starting")));
    let id = listed[0].str_field("id").unwrap();

    let k = kernel.clone();
    let stopping = tokio::spawn(async move {
        k.schedule_operation("shutdown", Prop::from(json!({"id": id})), Transform::Raw)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    kernels.release.notify_one();
    started.await.unwrap().unwrap();
    assert_eq!(stopping.await.unwrap().unwrap(), Prop::from(true));
    assert_eq!(
        *kernels.log.lock().unwrap(),
        vec!["start julia".to_string(), "stop kernel-1".to_string()]
    );
}

#[tokio::test]
async fn test_menu_items_need_known_commands() {
    let host = host();
    let (_gui, kernel) = open(&host, "Menus").await;

    let missing = kernel
        .schedule_operation(
            "addItem",
            Prop::from(json!({"menu": "file", "command": "save"})),
            Transform::Null,
        )
        .await;
    assert!(missing.is_err());

    commands::add_command(
        &part(&host, COMMANDS_PATH),
        "save",
        "Save",
        None,
        Method::sync(|_, _| Ok(Prop::Null)),
    )
    .unwrap();
    kernel
        .schedule_operation(
            "addItem",
            Prop::from(json!({"menu": "file", "command": "save", "rank": 1})),
            Transform::Null,
        )
        .await
        .unwrap();

    let items = kernel
        .schedule_operation("listItems", Prop::from(json!({"menu": "file"})), Transform::Raw)
        .await
        .unwrap();
    assert_eq!(items, Prop::from(json!([{"command": "save", "rank": 1}])));
}

#[tokio::test]
async fn test_open_remote_over_tcp() {
    let host = Arc::new(host());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(host.clone().serve(listener, shutdown.clone()));

    let kernel = open_remote(
        addr,
        &ModelRequest::model(notifications::CLASS),
        kernel_spec(kernel_handlers()),
        Arc::new(BridgeContext::default()),
    )
    .await
    .unwrap();
    kernel.ready().await.unwrap();

    let id = kernel
        .schedule_operation(
            "notify",
            Prop::from(json!({"message": "over tcp"})),
            Transform::Raw,
        )
        .await
        .unwrap();
    assert!(id.as_str().is_some());
    // Both ends share the id the host minted
    assert_eq!(host.ids(), vec![kernel.id().to_string()]);

    let refused = open_remote(
        addr,
        &ModelRequest::model("Teapot"),
        kernel_spec(kernel_handlers()),
        Arc::new(BridgeContext::default()),
    )
    .await;
    assert!(refused.is_err());

    // Shutting the host down ends every session it opened
    shutdown.cancel();
    timeout(Duration::from_secs(2), kernel.closed())
        .await
        .expect("kernel bridge did not close");
    assert_eq!(kernel.state(), BridgeState::Closed);
    server.await.unwrap().unwrap();
}
