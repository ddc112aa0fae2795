//! ==============================================================================
//! connector.rs - viewer-side telemetry connection
//! ==============================================================================
//!
//! purpose:
//!     opens the duplex channel to the host and turns every inbound snapshot
//!     frame into a synchronous call of the registered handler.
//!
//! lifecycle:
//! ```text
//!     connect() ──► receive loop running ──► close frame / error / cancel
//!                                                   │
//!                                   is_connected() == false
//! ```
//!
//! the receive loop never reconnects on its own. whoever owns the
//! connector polls is_connected() and calls connect() again.
//!
//! relationships:
//!     - talks to: server.rs (over the wire)
//!     - feeds: viewer/state.rs (through the handler)
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::domain::Snapshot;
use crate::error::{Result, TelemetryError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// called once per parsed snapshot, on the receive loop
pub type SnapshotHandler = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// upper bound on the tcp + upgrade handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct Session {
    writer: SplitSink<WsStream, Message>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Connector {
    url: String,
    handler: SnapshotHandler,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl Connector {
    pub fn new(url: impl Into<String>, handler: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        Self {
            url: url.into(),
            handler: Arc::new(handler),
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// open the channel and start the receive loop; no-op while connected
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        // leftovers of a session whose loop already ended
        if let Some(stale) = session.take() {
            stale.cancel.cancel();
            let _ = stale.task.await;
        }

        let (stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TelemetryError::ConnectionLost(format!("connect to {} timed out", self.url)))??;
        let (writer, reader) = stream.split();

        let cancel = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);
        let task = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&self.handler),
            Arc::clone(&self.connected),
            cancel.clone(),
        ));

        *session = Some(Session { writer, cancel, task });
        tracing::info!("[CONNECTOR] Connected to {}", self.url);
        Ok(())
    }

    /// close the channel and wait (at most `timeout`) for the receive loop to end
    pub async fn disconnect(&self, timeout: Duration) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };

        if self.is_connected() {
            let frame = CloseFrame { code: CloseCode::Normal, reason: "Client disconnect".into() };
            match tokio::time::timeout(timeout, session.writer.send(Message::Close(Some(frame)))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("[CONNECTOR] Close frame not sent: {}", e),
                Err(_) => tracing::debug!("[CONNECTOR] Close frame timed out"),
            }
        }

        session.cancel.cancel();
        let outcome = match tokio::time::timeout(timeout, &mut session.task).await {
            Ok(_) => Ok(()),
            Err(_) => {
                tracing::warn!("[CONNECTOR] Receive loop still running after {:?}, aborting", timeout);
                session.task.abort();
                let _ = session.task.await;
                Err(TelemetryError::ShutdownTimeout(timeout))
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("[CONNECTOR] Disconnected from {}", self.url);
        outcome
    }
}

async fn receive_loop(
    mut reader: SplitStream<WsStream>,
    handler: SnapshotHandler,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = reader.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                // anything that is not a snapshot shares the channel and is skipped
                match Snapshot::parse(&text) {
                    Ok(snapshot) => handler(snapshot),
                    Err(e) => tracing::trace!("[CONNECTOR] Skipped frame: {}", e),
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!("[CONNECTOR] Receive failed: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    tracing::debug!("[CONNECTOR] Receive loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// accepts one websocket, sends `frames`, then keeps the socket open until told to drop it
    async fn one_shot_server(frames: Vec<String>) -> (String, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (hang_up, hung_up) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame)).await.unwrap();
            }
            let _ = hung_up.await;
            let _ = ws.close(None).await;
        });

        (url, hang_up)
    }

    fn collecting() -> (impl Fn(Snapshot) + Send + Sync + 'static, mpsc::UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |s: Snapshot| drop(tx.send(s)), rx)
    }

    #[tokio::test]
    async fn test_only_snapshots_reach_the_handler() {
        let (url, _hang_up) = one_shot_server(vec![
            r#"{"message":"hello","timestamp":1}"#.to_string(),
            "{{ not json".to_string(),
            r#"{"AccelerationZ":1.01,"Temperature":22.5}"#.to_string(),
        ])
        .await;

        let (handler, mut rx) = collecting();
        let connector = Connector::new(url, handler);
        connector.connect().await.unwrap();
        assert!(connector.is_connected());

        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot.acceleration_z, Some(1.01));
        assert_eq!(snapshot.temperature, Some(22.5));
        assert!(rx.try_recv().is_err());

        connector.disconnect(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_is_observed() {
        let (url, hang_up) = one_shot_server(vec![]).await;
        let (handler, _rx) = collecting();
        let connector = Connector::new(url, handler);
        connector.connect().await.unwrap();

        hang_up.send(()).unwrap();
        for _ in 0..100 {
            if !connector.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_open() {
        let (url, _hang_up) = one_shot_server(vec![]).await;
        let (handler, _rx) = collecting();
        let connector = Connector::new(url, handler);

        connector.connect().await.unwrap();
        // the server only accepts once; a second real connect would hang or fail
        connector.connect().await.unwrap();
        assert!(connector.is_connected());
        connector.disconnect(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_waits_for_a_blocked_receive_loop() {
        // the server never reads, so our close frame is never answered
        let (url, _hang_up) = one_shot_server(vec![]).await;
        let (handler, _rx) = collecting();
        let connector = Connector::new(url, handler);
        connector.connect().await.unwrap();

        let bound = Duration::from_millis(500);
        let started = std::time::Instant::now();
        connector.disconnect(bound).await.unwrap();

        assert!(started.elapsed() < bound * 2);
        assert!(!connector.is_connected());
        // a second disconnect has nothing left to do
        connector.disconnect(bound).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handler, _rx) = collecting();
        let connector = Connector::new(format!("ws://{}/ws", addr), handler);
        assert!(connector.connect().await.is_err());
        assert!(!connector.is_connected());
    }
}
