//! End-to-end: hub + websocket endpoint + viewer-side connector.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use marlin_telemetry::config::TimingConfig;
use marlin_telemetry::connector::Connector;
use marlin_telemetry::server::{self, ServerState, ViewerHub};
use marlin_telemetry::viewer::state::ViewState;
use marlin_telemetry::viewer::supervise;
use marlin_telemetry::{Channel, Snapshot};

struct Host {
    hub: Arc<ViewerHub>,
    url: String,
    cancel: CancellationToken,
}

impl Drop for Host {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_host() -> Host {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let hub = Arc::new(ViewerHub::new());
    let cancel = CancellationToken::new();

    let app = server::router(ServerState { hub: hub.clone(), hal: None }, "/ws");
    tokio::spawn(server::serve(listener, app, cancel.clone()));

    Host { hub, url, cancel }
}

async fn wait_for_viewers(hub: &ViewerHub, count: usize) {
    for _ in 0..200 {
        if hub.connection_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} viewers, have {}", count, hub.connection_count());
}

async fn next_text<S>(stream: &mut S) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("no frame within 2s")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = message {
            return text;
        }
    }
}

fn reading() -> Snapshot {
    let mut s = Snapshot::default();
    s.set(Channel::AccelerationX, 0.01);
    s.set(Channel::AccelerationY, -0.02);
    s.set(Channel::AccelerationZ, 1.0);
    s.set(Channel::Co2, 415.0);
    s
}

#[tokio::test]
async fn test_two_viewers_receive_identical_frames() {
    let host = start_host().await;
    let (mut a, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    let (mut b, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    wait_for_viewers(&host.hub, 2).await;

    assert_eq!(host.hub.broadcast(&reading()).await, 2);

    let frame_a = next_text(&mut a).await;
    let frame_b = next_text(&mut b).await;
    assert_eq!(frame_a, frame_b);
    assert_eq!(
        frame_a,
        r#"{"accelerationX":0.01,"accelerationY":-0.02,"accelerationZ":1.0,"co2":415.0}"#
    );
}

#[tokio::test]
async fn test_departed_viewer_does_not_block_the_rest() {
    let host = start_host().await;
    let (mut stays, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    let (leaves, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    wait_for_viewers(&host.hub, 2).await;

    drop(leaves);
    for _ in 0..5 {
        host.hub.broadcast(&reading()).await;
    }
    wait_for_viewers(&host.hub, 1).await;

    host.hub.broadcast(&reading()).await;
    assert_eq!(Snapshot::parse(&next_text(&mut stays).await).unwrap(), reading());
}

#[tokio::test]
async fn test_connector_feeds_view_state_and_skips_control_messages() {
    let host = start_host().await;
    let state = ViewState::shared(80);
    let received = Arc::new(Mutex::new(Vec::new()));

    let connector = Connector::new(host.url.clone(), {
        let state = state.clone();
        let received = received.clone();
        move |snapshot: Snapshot| {
            state.lock().unwrap().ingest(&snapshot);
            received.lock().unwrap().push(snapshot);
        }
    });
    connector.connect().await.unwrap();
    wait_for_viewers(&host.hub, 1).await;

    host.hub.announce("hello").await;
    host.hub.broadcast(&reading()).await;

    for _ in 0..200 {
        if !received.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(received.lock().unwrap().clone(), vec![reading()]);
    assert_eq!(state.lock().unwrap().latched().co2, Some(415.0));

    connector.disconnect(Duration::from_secs(1)).await.unwrap();
    assert!(!connector.is_connected());
    wait_for_viewers(&host.hub, 0).await;
}

#[tokio::test]
async fn test_connector_notices_host_shutdown_and_reconnects() {
    let host = start_host().await;
    let connector = Connector::new(host.url.clone(), |_| {});
    connector.connect().await.unwrap();
    wait_for_viewers(&host.hub, 1).await;

    host.hub.shutdown(Duration::from_secs(1)).await.unwrap();
    for _ in 0..200 {
        if !connector.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!connector.is_connected());

    connector.connect().await.unwrap();
    assert!(connector.is_connected());
    wait_for_viewers(&host.hub, 1).await;
    connector.disconnect(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_sends_close_frames_without_waiting_for_replies() {
    let host = start_host().await;
    let (mut silent, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    wait_for_viewers(&host.hub, 1).await;

    // the viewer is not polled, so it cannot answer before shutdown returns
    let started = Instant::now();
    host.hub.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(host.hub.connection_count(), 0);

    match tokio::time::timeout(Duration::from_secs(2), silent.next()).await.unwrap() {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.reason, "Server shutdown"),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_supervise_reconnects_after_host_drops_viewers() {
    let host = start_host().await;
    let connector = Arc::new(Connector::new(host.url.clone(), |_| {}));
    connector.connect().await.unwrap();
    wait_for_viewers(&host.hub, 1).await;

    let cancel = CancellationToken::new();
    let supervisor = tokio::spawn({
        let connector = connector.clone();
        let cancel = cancel.clone();
        let timing = TimingConfig { poll_ms: 10, retry_ms: 50, ..TimingConfig::default() };
        async move { supervise(&connector, &timing, &cancel).await }
    });

    // the registry is emptied, so a viewer showing up again is a fresh connection
    host.hub.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(host.hub.connection_count(), 0);
    wait_for_viewers(&host.hub, 1).await;
    for _ in 0..200 {
        if connector.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(connector.is_connected());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), supervisor).await.unwrap().unwrap();
    connector.disconnect(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_supervise_backs_off_between_failed_attempts() {
    // accepts tcp and hangs up at once, so every websocket handshake fails
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let attempts = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn({
        let attempts = attempts.clone();
        async move {
            while let Ok((tcp, _)) = listener.accept().await {
                attempts.lock().unwrap().push(Instant::now());
                drop(tcp);
            }
        }
    });

    let connector = Connector::new(url, |_| {});
    let timing = TimingConfig { poll_ms: 10, retry_ms: 100, ..TimingConfig::default() };
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(550)).await;
        stopper.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), supervise(&connector, &timing, &cancel))
        .await
        .unwrap();
    assert!(!connector.is_connected());

    let attempts = attempts.lock().unwrap().clone();
    assert!(attempts.len() >= 2, "only {} attempts", attempts.len());
    assert!(attempts.len() <= 5, "{} attempts in 550ms", attempts.len());
    for pair in attempts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
}

#[tokio::test]
async fn test_status_endpoint_counts_viewers() {
    let host = start_host().await;
    let (_viewer, _) = tokio_tungstenite::connect_async(host.url.as_str()).await.unwrap();
    wait_for_viewers(&host.hub, 1).await;

    let addr = host.url.trim_start_matches("ws://").trim_end_matches("/ws").to_string();
    let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(format!("GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", addr).as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""viewers":1"#));
    assert!(response.contains(r#""fan":false"#));
}
