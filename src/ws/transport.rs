//! Transport seam and the tokio-tungstenite driver

use super::types::CloseFrame;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How long to wait for the peer to answer our close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Event raised by a transport, in the order the connection produced it
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Text(String),
    Binary(Vec<u8>),
    Error(String),
    /// Always the last event of a transport
    Close(CloseFrame),
}

/// Command sent to a transport
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close(CloseFrame),
}

/// Manager side of a transport
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Connector side of a transport
pub struct TransportEnd {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl TransportLink {
    /// Create both halves of a transport
    pub fn pair() -> (TransportLink, TransportEnd) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                outbound: outbound_tx,
                events: events_rx,
            },
            TransportEnd {
                events: events_tx,
                outbound: outbound_rx,
            },
        )
    }
}

impl TransportEnd {
    /// Report an event; the manager may already have discarded this transport
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// Creates transports. Must be called from within a tokio runtime.
pub trait Connector: Send + Sync + 'static {
    /// Start connecting to `url` and return the manager side immediately
    fn dial(&self, url: &str) -> TransportLink;
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn dial(&self, url: &str) -> TransportLink {
        let (link, end) = TransportLink::pair();
        let url = url.to_string();

        tokio::spawn(async move {
            drive(url, end).await;
        });

        link
    }
}

fn to_wire(frame: &CloseFrame) -> WireCloseFrame<'static> {
    WireCloseFrame {
        code: CloseCode::from(frame.code),
        reason: frame.reason.clone().into(),
    }
}

fn from_wire(frame: Option<WireCloseFrame<'_>>) -> CloseFrame {
    match frame {
        Some(frame) => CloseFrame::new(u16::from(frame.code), frame.reason.into_owned()),
        // 1005: no status code was present in the close frame
        None => CloseFrame::new(1005, ""),
    }
}

/// Run one connection until it closes
async fn drive(url: String, mut end: TransportEnd) {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let handshake = connect_async(url.as_str());
    tokio::pin!(handshake);

    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((ws_stream, _response)) => break ws_stream,
                Err(e) => {
                    end.emit(TransportEvent::Error(e.to_string()));
                    end.emit(TransportEvent::Close(CloseFrame::abnormal()));
                    return;
                }
            },
            command = end.outbound.recv() => match command {
                Some(Outbound::Close(frame)) => {
                    tracing::debug!(code = frame.code, "Connection closed before handshake completed");
                    end.emit(TransportEvent::Close(frame));
                    return;
                }
                Some(Outbound::Text(_)) => {
                    tracing::debug!("Dropping frame sent before the connection opened");
                }
                None => return,
            }
        }
    };

    let (mut write, mut read) = ws_stream.split();
    end.emit(TransportEvent::Open);

    let mut accepting_commands = true;
    let mut close_deadline: Option<Instant> = None;
    let mut sent_close: Option<CloseFrame> = None;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        end.emit(TransportEvent::Text(text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        end.emit(TransportEvent::Binary(data));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            tracing::debug!(error = %e, "Failed to answer ping");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let frame = from_wire(frame);
                        tracing::debug!(code = frame.code, reason = %frame.reason, "Received close frame");
                        let _ = write.close().await;
                        end.emit(TransportEvent::Close(frame));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if sent_close.is_none() {
                            end.emit(TransportEvent::Error(e.to_string()));
                        }
                        end.emit(TransportEvent::Close(
                            sent_close.take().unwrap_or_else(CloseFrame::abnormal),
                        ));
                        return;
                    }
                    None => {
                        end.emit(TransportEvent::Close(
                            sent_close.take().unwrap_or_else(CloseFrame::abnormal),
                        ));
                        return;
                    }
                }
            }

            command = end.outbound.recv(), if accepting_commands => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            end.emit(TransportEvent::Error(e.to_string()));
                        }
                    }
                    Some(Outbound::Close(frame)) => {
                        let _ = write.send(Message::Close(Some(to_wire(&frame)))).await;
                        close_deadline = Some(Instant::now() + CLOSE_GRACE);
                        sent_close = Some(frame);
                        accepting_commands = false;
                    }
                    None => {
                        // Manager dropped the handle without closing
                        let frame = CloseFrame::client_disconnect();
                        let _ = write.send(Message::Close(Some(to_wire(&frame)))).await;
                        close_deadline = Some(Instant::now() + CLOSE_GRACE);
                        sent_close = Some(frame);
                        accepting_commands = false;
                    }
                }
            }

            _ = async {
                match close_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::debug!("Peer did not answer close frame in time");
                end.emit(TransportEvent::Close(
                    sent_close.take().unwrap_or_else(CloseFrame::client_disconnect),
                ));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_pair_connects_both_halves() {
        let (mut link, mut end) = TransportLink::pair();

        link.outbound.send(Outbound::Text("hi".to_string())).unwrap();
        assert_eq!(end.outbound.try_recv().unwrap(), Outbound::Text("hi".to_string()));

        end.emit(TransportEvent::Open);
        assert_eq!(link.events.try_recv().unwrap(), TransportEvent::Open);
    }

    #[test]
    fn test_emit_after_link_dropped() {
        let (link, end) = TransportLink::pair();
        drop(link);
        // Must not panic
        end.emit(TransportEvent::Close(CloseFrame::abnormal()));
    }

    #[test]
    fn test_close_frame_wire_conversion() {
        let wire = to_wire(&CloseFrame::client_disconnect());
        assert_eq!(u16::from(wire.code), 4000);
        assert_eq!(wire.reason, "Client initiated disconnect");

        let back = from_wire(Some(wire));
        assert_eq!(back, CloseFrame::client_disconnect());
        assert_eq!(from_wire(None).code, 1005);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind and drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut link = TungsteniteConnector.dial(&format!("ws://{}/ws", addr));

        let first = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .expect("Test timed out");
        assert!(matches!(first, Some(TransportEvent::Error(_))));

        let second = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .expect("Test timed out");
        assert_eq!(second, Some(TransportEvent::Close(CloseFrame::abnormal())));
    }

    #[tokio::test]
    async fn test_close_command_during_handshake() {
        // Accepts TCP but never answers the HTTP upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut link = TungsteniteConnector.dial(&format!("ws://{}/ws", addr));
        link.outbound
            .send(Outbound::Close(CloseFrame::open_timeout()))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .expect("Test timed out");
        assert_eq!(event, Some(TransportEvent::Close(CloseFrame::open_timeout())));
    }
}
