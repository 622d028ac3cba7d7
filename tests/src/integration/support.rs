//! In-process mock DeviceHive servers.
//!
//! `MockWs` speaks the WebSocket device protocol over a real socket; every
//! frame the client sends is forwarded to the test and answered by a
//! handler. `MockRest` is an axum router covering the REST calls the flows
//! use, with knobs for poll batches and injected failures.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as HandshakeResponse};
use tokio_tungstenite::tungstenite::Message;

pub const T0: &str = "2026-10-19T08:00:00.000000";
pub const T1: &str = "2026-10-19T08:00:01.000000";
pub const T2: &str = "2026-10-19T08:00:02.000000";

/// Routes client logs to the test harness. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// =============================================================================
// WEBSOCKET
// =============================================================================

/// What the mock does with one client frame.
pub enum Reply {
    /// Send these frames back, possibly none.
    Frames(Vec<Value>),
    /// Close the connection.
    Hangup,
}

pub type WsHandler = Box<dyn FnMut(&Value) -> Reply + Send>;

/// Upgrade request as the server saw it.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub path: String,
    pub authorization: Option<String>,
}

pub struct MockWs {
    /// `ws://` base URL, without the endpoint segment
    pub base_url: String,
    pub handshake: Arc<Mutex<Option<Handshake>>>,
    /// Every frame the client sent, in order
    pub received: mpsc::UnboundedReceiver<Value>,
}

impl MockWs {
    /// Next client frame with `action`, skipping others.
    pub async fn expect(&mut self, action: &str) -> Value {
        let wait = async {
            while let Some(frame) = self.received.recv().await {
                if frame["action"] == action {
                    return frame;
                }
            }
            panic!("connection ended before {action}");
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("no {action} frame"))
    }
}

/// Accepts one WebSocket connection and answers it with `handler`.
pub async fn spawn_ws(mut handler: WsHandler) -> MockWs {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, received) = mpsc::unbounded_channel();
    let handshake = Arc::new(Mutex::new(None));
    let seen = handshake.clone();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let callback = move |request: &Request, response: HandshakeResponse| -> Result<HandshakeResponse, ErrorResponse> {
            *seen.lock() = Some(Handshake {
                path: request.uri().path().to_string(),
                authorization: request
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            });
            Ok(response)
        };
        let Ok(mut socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            return;
        };

        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            let _ = tx.send(frame.clone());
            match handler(&frame) {
                Reply::Frames(frames) => {
                    for frame in frames {
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Reply::Hangup => {
                    let _ = socket.close(None).await;
                    return;
                }
            }
        }
    });

    MockWs {
        base_url: format!("ws://{addr}"),
        handshake,
        received,
    }
}

/// Successful response to `request` carrying `fields`.
pub fn success(request: &Value, fields: Value) -> Value {
    let mut response = json!({
        "action": request["action"],
        "requestId": request["requestId"],
        "status": "success",
    });
    if let (Some(target), Value::Object(extra)) = (response.as_object_mut(), fields) {
        target.extend(extra);
    }
    response
}

pub fn failure(request: &Value, code: i64, error: &str) -> Value {
    json!({
        "action": request["action"],
        "requestId": request["requestId"],
        "status": "error",
        "code": code,
        "error": error,
    })
}

pub fn push_command(device_id: &str, command: Value) -> Value {
    json!({"action": "command/insert", "deviceGuid": device_id, "command": command})
}

pub fn push_notification(device_id: &str, notification: Value) -> Value {
    json!({"action": "notification/insert", "deviceGuid": device_id, "notification": notification})
}

/// A well-behaved device endpoint.
///
/// Subscribing to commands pushes one `blink` command (id 7) right after
/// the response.
pub fn device_hive_ws() -> WsHandler {
    Box::new(|request: &Value| {
        let action = request["action"].as_str().unwrap_or_default();
        let frames = match action {
            "server/info" => vec![success(
                request,
                json!({"info": {"apiVersion": "3.0", "serverTimestamp": T0}}),
            )],
            "authenticate" | "device/save" | "command/update" | "command/unsubscribe"
            | "notification/subscribe" | "notification/unsubscribe" => {
                vec![success(request, json!({}))]
            }
            "device/get" => vec![success(
                request,
                json!({"device": {"id": request["deviceId"], "name": "Demo", "status": "Online"}}),
            )],
            "command/insert" => vec![success(request, json!({"command": {"id": 5, "timestamp": T1}}))],
            "notification/insert" => vec![success(
                request,
                json!({"notification": {"id": 11, "timestamp": T1}}),
            )],
            "command/subscribe" => {
                let device_id = request["deviceId"].as_str().unwrap_or_default();
                vec![
                    success(request, json!({})),
                    push_command(
                        device_id,
                        json!({"id": 7, "timestamp": T1, "command": "blink", "parameters": {"times": 3}}),
                    ),
                ]
            }
            _ => vec![failure(request, 404, "unknown action")],
        };
        Reply::Frames(frames)
    })
}

// =============================================================================
// REST
// =============================================================================

#[derive(Default)]
pub struct RestState {
    /// Batches served by successive command polls; empty polls idle briefly
    pub command_batches: Mutex<VecDeque<Value>>,
    /// Number of upcoming polls answered with 500
    pub failing_polls: AtomicUsize,
    /// Query string of every command poll
    pub polls: Mutex<Vec<HashMap<String, String>>>,
    /// `(command id, body)` of every command update
    pub updates: Mutex<Vec<(u64, Value)>>,
    /// `Authorization` and `Auth-DeviceID` of every device-authenticated call
    pub auth: Mutex<Vec<(Option<String>, Option<String>)>>,
    pub devices: Mutex<HashMap<String, Value>>,
    pub networks: Mutex<Vec<Value>>,
}

impl RestState {
    fn record_auth(&self, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.auth
            .lock()
            .push((header("authorization"), header("auth-deviceid")));
    }

    pub fn queue_commands(&self, batch: Value) {
        self.command_batches.lock().push_back(batch);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().len()
    }
}

pub struct MockRest {
    pub base_url: String,
    pub state: Arc<RestState>,
}

pub async fn spawn_rest() -> MockRest {
    let state = Arc::new(RestState::default());
    let api = Router::new()
        .route("/info", get(info))
        .route("/device/:id", put(register_device).get(get_device))
        .route("/device/:id/command", post(insert_command))
        .route("/device/:id/command/poll", get(poll_commands))
        .route("/device/:id/command/:command_id", put(update_command))
        .route("/device/:id/notification", post(insert_notification))
        .route("/network", get(list_networks).post(insert_network))
        .with_state(state.clone());
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockRest {
        base_url: format!("http://{addr}/api"),
        state,
    }
}

type Shared = State<Arc<RestState>>;

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": 404, "message": message})),
    )
        .into_response()
}

async fn info() -> Json<Value> {
    Json(json!({"apiVersion": "3.0", "serverTimestamp": T0}))
}

async fn register_device(
    State(state): Shared,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    state.record_auth(&headers);
    state.devices.lock().insert(id, body);
    StatusCode::NO_CONTENT
}

async fn get_device(State(state): Shared, Path(id): Path<String>) -> Response {
    let device = state.devices.lock().get(&id).cloned();
    match device {
        Some(mut device) => {
            device["id"] = json!(id);
            Json(device).into_response()
        }
        None => not_found("Device not found"),
    }
}

async fn insert_command(State(state): Shared, Path(id): Path<String>, headers: HeaderMap) -> Response {
    state.record_auth(&headers);
    if !state.devices.lock().contains_key(&id) {
        return not_found("Device not found");
    }
    (StatusCode::CREATED, Json(json!({"id": 5, "timestamp": T1}))).into_response()
}

async fn poll_commands(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.record_auth(&headers);
    state.polls.lock().push(query);

    let failing = state
        .failing_polls
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": 500, "message": "poll backend unavailable"})),
        )
            .into_response();
    }

    let batch = state.command_batches.lock().pop_front();
    match batch {
        Some(batch) => Json(batch).into_response(),
        None => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Json(json!([])).into_response()
        }
    }
}

async fn update_command(
    State(state): Shared,
    Path((_, command_id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    state.record_auth(&headers);
    state.updates.lock().push((command_id, body));
    StatusCode::NO_CONTENT
}

async fn insert_notification(headers: HeaderMap, State(state): Shared) -> Response {
    state.record_auth(&headers);
    (StatusCode::CREATED, Json(json!({"id": 11, "timestamp": T1}))).into_response()
}

async fn list_networks(State(state): Shared) -> Json<Value> {
    Json(Value::Array(state.networks.lock().clone()))
}

async fn insert_network(State(state): Shared, Json(mut body): Json<Value>) -> Json<Value> {
    let mut networks = state.networks.lock();
    let id = networks.len() as u64 + 1;
    body["id"] = json!(id);
    networks.push(body);
    Json(json!({"id": id}))
}
