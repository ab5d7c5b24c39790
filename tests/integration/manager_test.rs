//! Integration tests for the connection manager against a local server

use futures_util::{SinkExt, StreamExt};
use mindful_ws::ws::{
    CloseFrame, ConnectOptions, ConnectionManager, Event, EventKind, ManagerConfig,
    MessagePayload, WsError,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// Accept WebSocket connections forever, handing each to `handler` with its index
async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(usize, WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        let accepted = AtomicUsize::new(0);
        while let Ok((stream, _)) = listener.accept().await {
            let index = accepted.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    handler(index, ws).await;
                }
            });
        }
    });

    addr
}

async fn echo(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                if ws.send(msg).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

fn local_config() -> ManagerConfig {
    ManagerConfig::default()
        .allow_insecure_localhost(true)
        .base_delay(Duration::from_millis(20))
        .open_timeout(Duration::from_secs(2))
}

fn subscribe(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in EventKind::ALL {
        let tx = tx.clone();
        manager.on(
            kind,
            Arc::new(move |event: &Event| {
                let _ = tx.send(event.clone());
            }),
        );
    }
    rx
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("Test timed out")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_echo_round_trip() {
    let addr = spawn_server(|_, ws| echo(ws)).await;
    let manager = ConnectionManager::new(local_config());
    let mut events = subscribe(&manager);

    manager
        .connect(&format!("ws://{}/ws", addr), ConnectOptions::default())
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Open);
    assert!(manager.is_connected());

    manager.send(json!({"type": "hello", "content": "world"})).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Message(MessagePayload::Json(json!({"type": "hello", "content": "world"})))
    );

    manager.send("Echo: not json").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Message(MessagePayload::Raw("Echo: not json".to_string()))
    );

    manager.disconnect();
    assert!(!manager.is_connected());
    assert_eq!(manager.send("late"), Err(WsError::NotConnected));
}

#[tokio::test]
async fn test_server_going_away_triggers_reconnect() {
    let addr = spawn_server(|index, mut ws| async move {
        if index == 0 {
            let _ = ws
                .close(Some(WireCloseFrame {
                    code: CloseCode::Away,
                    reason: "restarting".into(),
                }))
                .await;
            // Drain until the client answers the close
            while let Some(Ok(_)) = ws.next().await {}
        } else {
            echo(ws).await;
        }
    })
    .await;

    let manager = ConnectionManager::new(local_config());
    let mut events = subscribe(&manager);
    manager
        .connect(
            &format!("ws://{}/ws", addr),
            ConnectOptions::default().enable_ping(false),
        )
        .unwrap();

    assert_eq!(next_event(&mut events).await, Event::Open);
    assert_eq!(
        next_event(&mut events).await,
        Event::Close(CloseFrame::new(1001, "restarting"))
    );
    assert_eq!(next_event(&mut events).await, Event::Open);
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.send("still here").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Message(MessagePayload::Raw("still here".to_string()))
    );

    manager.disconnect();
}

#[tokio::test]
async fn test_disconnect_sends_client_close_code() {
    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    let addr = spawn_server(move |_, mut ws| {
        let close_tx = close_tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Close(frame) = msg {
                    let frame = frame.map(|f| (u16::from(f.code), f.reason.into_owned()));
                    let _ = close_tx.send(frame);
                    break;
                }
            }
        }
    })
    .await;

    let manager = ConnectionManager::new(local_config());
    let mut events = subscribe(&manager);
    manager
        .connect(&format!("ws://{}/ws", addr), ConnectOptions::default())
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Open);

    manager.disconnect();

    let frame = tokio::time::timeout(WAIT, close_rx.recv())
        .await
        .expect("Test timed out")
        .expect("server stopped");
    assert_eq!(frame, Some((4000, "Client initiated disconnect".to_string())));
}

#[tokio::test]
async fn test_keepalive_reaches_server() {
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    let addr = spawn_server(move |_, mut ws| {
        let ping_tx = ping_tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let _ = ping_tx.send(text);
                }
            }
        }
    })
    .await;

    let manager = ConnectionManager::new(local_config());
    let mut events = subscribe(&manager);
    manager
        .connect(
            &format!("ws://{}/ws", addr),
            ConnectOptions::default().ping_interval(Duration::from_millis(50)),
        )
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Open);

    let text = tokio::time::timeout(WAIT, ping_rx.recv())
        .await
        .expect("Test timed out")
        .expect("server stopped");
    let ping: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(ping["type"], "ping");
    assert!(ping["timestamp"].as_i64().unwrap() > 0);

    manager.disconnect();
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // Bind and drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(
        local_config()
            .max_reconnects(2)
            .base_delay(Duration::from_millis(5)),
    );
    let mut events = subscribe(&manager);
    manager
        .connect(&format!("ws://{}/ws", addr), ConnectOptions::default())
        .unwrap();

    let mut closes = 0;
    loop {
        match next_event(&mut events).await {
            Event::Close(frame) => {
                assert_eq!(frame.code, 1006);
                closes += 1;
            }
            Event::MaxReconnectAttemptsReached { attempts } => {
                assert_eq!(attempts, 2);
                break;
            }
            Event::Error(WsError::Transport(_)) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }

    // The first attempt plus two retries
    assert_eq!(closes, 3);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_remote_insecure_url_rejected() {
    let manager = ConnectionManager::new(local_config());
    let mut events = subscribe(&manager);

    let result = manager.connect("ws://mindful.example/ws", ConnectOptions::default());

    assert!(matches!(result, Err(WsError::InvalidUrl { .. })));
    assert!(matches!(
        next_event(&mut events).await,
        Event::Error(WsError::InvalidUrl { .. })
    ));
    assert!(manager.ready_state().is_none());
}
