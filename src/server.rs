//! ==============================================================================
//! server.rs - websocket endpoint feeding the hub
//! ==============================================================================
//!
//! purpose:
//!     accepts viewer connections on the well-known path, wraps each socket's
//!     write half as a hub Connection and keeps reading the other half until
//!     the viewer leaves. also serves a small json status endpoint.
//!
//! routes:
//!     GET /ws      -> websocket upgrade (path configurable)
//!     GET /status  -> {"viewers": n, "fan": bool}
//!
//! relationships:
//!     - registers into: hub.rs
//!     - started by: main.rs
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{Json, Response},
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;
use crate::hub::{Connection, Hub};

pub type ViewerHub = Hub<WsConnection>;

/// write half of an accepted viewer socket
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink: Mutex::new(sink), open: AtomicBool::new(true) }
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn lost(&self, e: axum::Error) -> TelemetryError {
        self.mark_closed();
        TelemetryError::ConnectionLost(e.to_string())
    }
}

impl Connection for WsConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_owned())).await.map_err(|e| self.lost(e))
    }

    /// writes the close frame only; the viewer's reply ends handle_socket's read loop
    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        self.mark_closed();
        let frame = CloseFrame { code: close_code::NORMAL, reason: "Server shutdown".into() };
        sink.send(Message::Close(Some(frame))).await.map_err(|e| self.lost(e))
    }
}

// ==============================================================================
// router
// ==============================================================================

#[derive(Clone)]
pub struct ServerState {
    pub hub: Arc<ViewerHub>,
    pub hal: Option<Arc<dyn HardwareProvider>>,
}

pub fn router(state: ServerState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// bind the configured endpoint address
pub async fn bind(config: &ServerConfig) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", config.bind, config.port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))
}

/// serve until `cancel` fires
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<ViewerHub>) {
    let (sink, mut stream) = socket.split();
    let connection = Arc::new(WsConnection::new(sink));
    let id = hub.register(connection.clone());

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                tracing::debug!("[SERVER] Received message from {}: {}", id, text);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[SERVER] WebSocket error for {}: {}", id, e);
                break;
            }
        }
    }

    connection.mark_closed();
    hub.remove(&id);
}

async fn status_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let fan = state.hal.as_ref().map(|h| h.fan_state()).unwrap_or(false);
    Json(serde_json::json!({
        "viewers": state.hub.connection_count(),
        "fan": fan,
    }))
}
