//! In-process stand-in for a browser's remote-debugging interface
//!
//! Serves the discovery endpoints and a per-tab devtools WebSocket on one
//! ephemeral port. Debugger URLs are advertised with a wrong host and port
//! so every client has to rewrite them.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chaser_capture::config::Config;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// 1x1 PNG
pub const PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

#[derive(Debug, Clone)]
pub struct Tab {
    pub id: String,
    pub title: String,
    pub url: String,
    pub html: String,
}

#[derive(Debug, Default)]
struct BrowserState {
    tabs: Mutex<Vec<Tab>>,
    next_tab: AtomicU64,
    stall_upgrades: AtomicBool,
}

impl BrowserState {
    fn open(&self, url: &str) -> Tab {
        let n = self.next_tab.fetch_add(1, Ordering::SeqCst);
        let tab = Tab {
            id: format!("TAB{:04}", n),
            title: url.to_string(),
            url: url.to_string(),
            html: page_html(url),
        };
        self.tabs.lock().unwrap().push(tab.clone());
        tab
    }

    fn tab(&self, id: &str) -> Option<Tab> {
        self.tabs.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Tab)) {
        if let Some(tab) = self.tabs.lock().unwrap().iter_mut().find(|t| t.id == id) {
            f(tab);
        }
    }
}

fn page_html(url: &str) -> String {
    match url.strip_prefix("data:text/html,") {
        Some(encoded) => urlencoding::decode(encoded)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| encoded.to_string()),
        None => "<html><head></head><body></body></html>".to_string(),
    }
}

/// `data:` URL carrying `html`
pub fn data_url(html: &str) -> String {
    format!("data:text/html,{}", urlencoding::encode(html))
}

fn target_json(tab: &Tab) -> Value {
    json!({
        "description": "",
        "devtoolsFrontendUrl": format!("/devtools/inspector.html?ws=localhost:1/devtools/page/{}", tab.id),
        "id": tab.id,
        "title": tab.title,
        "type": "page",
        "url": tab.url,
        "webSocketDebuggerUrl": format!("ws://localhost:1/devtools/page/{}", tab.id),
    })
}

pub struct MockChrome {
    addr: SocketAddr,
    state: Arc<BrowserState>,
    server: JoinHandle<()>,
}

impl MockChrome {
    /// Start with `tabs` blank tabs open
    pub async fn start(tabs: usize) -> Self {
        let state = Arc::new(BrowserState::default());
        for _ in 0..tabs {
            state.open("about:blank");
        }

        let app = Router::new()
            .route("/json/version", get(version))
            .route("/json/list", get(list))
            .route("/json", get(list))
            .route("/json/new", put(new_tab))
            .route("/json/close/{id}", get(close_tab))
            .route("/devtools/page/{id}", get(devtools))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, server }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn config(&self) -> Config {
        Config {
            cdp_host: "127.0.0.1".to_string(),
            cdp_port: self.port(),
            command_timeout_ms: 5_000,
            navigation_timeout_ms: 2_000,
            poll_interval_ms: 20,
            ..Config::default()
        }
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.state.tabs.lock().unwrap().clone()
    }

    /// Leave devtools upgrade requests unanswered, like a wedged browser
    pub fn stall_upgrades(&self, stall: bool) {
        self.state.stall_upgrades.store(stall, Ordering::SeqCst);
    }

    /// Replace a tab's document without a navigation
    pub fn set_html(&self, id: &str, html: &str) {
        self.state.update(id, |tab| tab.html = html.to_string());
    }
}

impl Drop for MockChrome {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn version() -> Json<Value> {
    Json(json!({
        "Browser": "HeadlessChrome/120.0.6099.109",
        "Protocol-Version": "1.3",
        "User-Agent": "Mozilla/5.0 HeadlessChrome/120.0.6099.109",
        "V8-Version": "12.0.267.8",
        "WebKit-Version": "537.36",
        "webSocketDebuggerUrl": "ws://localhost:1/devtools/browser/mock"
    }))
}

async fn list(State(state): State<Arc<BrowserState>>) -> Json<Value> {
    let mut targets: Vec<Value> = state.tabs.lock().unwrap().iter().map(target_json).collect();
    // non-page targets must not shift page indices
    targets.insert(
        0,
        json!({
            "id": "SW1",
            "type": "service_worker",
            "title": "Service Worker",
            "url": "https://example.com/sw.js",
            "webSocketDebuggerUrl": "ws://localhost:1/devtools/page/SW1"
        }),
    );
    Json(Value::Array(targets))
}

async fn new_tab(State(state): State<Arc<BrowserState>>, RawQuery(query): RawQuery) -> Json<Value> {
    let url = query
        .map(|q| urlencoding::decode(&q).map(|s| s.into_owned()).unwrap_or(q))
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| "about:blank".to_string());
    let tab = state.open(&url);
    Json(target_json(&tab))
}

async fn close_tab(State(state): State<Arc<BrowserState>>, Path(id): Path<String>) -> Response {
    let mut tabs = state.tabs.lock().unwrap();
    match tabs.iter().position(|t| t.id == id) {
        Some(index) => {
            tabs.remove(index);
            "Target is closing".into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("No such target id: {}", id)).into_response(),
    }
}

async fn devtools(
    State(state): State<Arc<BrowserState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.tab(&id).is_none() {
        return (StatusCode::NOT_FOUND, "No such target").into_response();
    }
    if state.stall_upgrades.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    ws.on_upgrade(move |socket| serve_tab(socket, id, state))
}

async fn serve_tab(socket: WebSocket, tab_id: String, state: Arc<BrowserState>) {
    let (mut sink, mut stream) = socket.split();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };

        let method = request["method"].as_str().unwrap_or_default().to_string();
        let (result, events) = handle_command(&state, &tab_id, &method, &request["params"]);

        let response = json!({ "id": request["id"], "result": result });
        if sink.send(Message::Text(response.to_string().into())).await.is_err() {
            break;
        }
        for (event, params) in events {
            let frame = json!({ "method": event, "params": params });
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

fn evaluated(value: Value) -> Value {
    let kind = match &value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "undefined",
        _ => "object",
    };
    json!({ "result": { "type": kind, "value": value } })
}

fn console_event(text: &str) -> Value {
    json!({
        "type": "log",
        "args": [{ "type": "string", "value": text }],
        "executionContextId": 1,
        "timestamp": 1_700_000_000_000.0_f64
    })
}

fn handle_command(state: &BrowserState, tab_id: &str, method: &str, params: &Value) -> (Value, Vec<(String, Value)>) {
    match method {
        "Page.navigate" => {
            let url = params["url"].as_str().unwrap_or("about:blank").to_string();
            state.update(tab_id, |tab| {
                tab.url = url.clone();
                tab.title = url.clone();
                tab.html = page_html(&url);
            });
            (
                json!({ "frameId": tab_id, "loaderId": "L1" }),
                vec![
                    ("Runtime.consoleAPICalled".to_string(), console_event(&format!("loaded {}", url))),
                    ("Page.loadEventFired".to_string(), json!({ "timestamp": 1.0 })),
                ],
            )
        }
        "Page.captureScreenshot" => (json!({ "data": PNG_BASE64 }), vec![]),
        "Runtime.evaluate" => {
            let expression = params["expression"].as_str().unwrap_or_default();
            let tab = state.tab(tab_id);
            (evaluated(evaluate(tab.as_ref(), expression)), vec![])
        }
        _ => (json!({}), vec![]),
    }
}

/// Crude stand-in for script evaluation, keyed on recognizable fragments
fn evaluate(tab: Option<&Tab>, expression: &str) -> Value {
    let html = tab.map(|t| t.html.as_str()).unwrap_or_default();

    if expression.contains("documentElement.outerHTML") {
        return json!(html);
    }
    if expression.contains("blocks.join") {
        return json!(format!("# {}", tab.map(|t| t.title.as_str()).unwrap_or_default()));
    }
    if expression.contains("viewportWidth") {
        return json!({ "width": 1280, "height": 1800, "viewportWidth": 1280, "viewportHeight": 720 });
    }
    if expression.contains("hasNavigation") {
        return json!({
            "buttons": html.matches("<button").count(),
            "inputs": html.matches("<input").count(),
            "links": html.matches("<a ").count(),
            "hasNavigation": html.contains("<nav"),
            "hasMain": html.contains("<main"),
            "hasForm": html.contains("<form"),
            "headings": []
        });
    }
    if expression.contains("innerText.includes(") {
        return json!(expression
            .split("includes(\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .map(|needle| html.contains(needle))
            .unwrap_or(false));
    }
    if expression.contains("querySelector(\"#") {
        let id = expression
            .split("querySelector(\"#")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap_or_default();
        let present = html.contains(&format!("id=\"{}\"", id));
        if expression.contains("!== null") {
            return json!(present);
        }
        if !present {
            return json!({ "found": false });
        }
        if expression.contains("el.options") {
            return json!({ "found": true, "matched": true, "value": "de" });
        }
        return json!({ "found": true, "value": "" });
    }
    if expression == "document.title" {
        return json!(tab.map(|t| t.title.as_str()).unwrap_or_default());
    }
    Value::Null
}
