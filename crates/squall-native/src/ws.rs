//! WebSocket event bridge
//!
//! After a successful upgrade the native layer owns the connection and
//! reports it through [`SocketEvents`]: one `on_open`, any number of
//! `on_message`, exactly one `on_close`. Writes go through the cloneable
//! [`NativeSocket`] handle. Once every handle is dropped the server starts
//! the closing handshake itself.

use crate::error::{Error, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Data message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Message> for WsMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => WsMessage::text(text),
            Message::Binary(data) => WsMessage::binary(data),
        }
    }
}

/// Close code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(1000, "")
    }

    pub fn going_away() -> Self {
        Self::new(1001, "Going away")
    }

    /// Peer sent a close frame without a status
    pub fn no_status() -> Self {
        Self::new(1005, "")
    }

    /// Connection dropped without a close frame
    pub fn abnormal() -> Self {
        Self::new(1006, "Abnormal closure")
    }

    pub fn invalid_payload() -> Self {
        Self::new(1007, "Invalid payload data")
    }

    fn to_frame(&self) -> CloseFrame {
        CloseFrame {
            code: CloseCode::from(self.code),
            reason: self.reason.clone().into(),
        }
    }
}

/// Outbound command queued on a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Message(Message),
    Close(CloseReason),
}

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Write handle for an open socket
#[derive(Debug, Clone)]
pub struct NativeSocket {
    id: u64,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl NativeSocket {
    fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// A socket not backed by a connection
    ///
    /// Everything written to it shows up on the returned receiver. Used to
    /// drive socket consumers in-process.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a message; text and binary framing follow the variant
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.tx
            .send(Outgoing::Message(message.into()))
            .map_err(|_| Error::SocketClosed)
    }

    /// Queue a close frame
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.tx
            .send(Outgoing::Close(CloseReason::new(code, reason)))
            .map_err(|_| Error::SocketClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Callbacks for one upgraded connection
pub trait SocketEvents: Send + Sync + 'static {
    fn on_open(&self, socket: NativeSocket);
    fn on_message(&self, message: Message);
    fn on_close(&self, reason: CloseReason);
}

/// How long to wait for the peer to answer our close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive an upgraded connection until it closes
pub(crate) async fn run_socket(upgraded: Upgraded, events: Arc<dyn SocketEvents>) {
    let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    let (mut sink, mut stream) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = NativeSocket::new(tx);
    let id = socket.id();

    debug!(socket = id, "websocket open");
    events.on_open(socket);

    // Set once we sent a close frame and are waiting for the echo
    let mut closing: Option<CloseReason> = None;
    let mut deadline: Option<Instant> = None;
    let mut writers_gone = false;

    let reason = loop {
        tokio::select! {
            outgoing = rx.recv(), if !writers_gone => {
                let reason = match outgoing {
                    Some(Outgoing::Message(message)) => {
                        if closing.is_some() {
                            continue;
                        }
                        if let Err(err) = sink.send(message.into()).await {
                            debug!(socket = id, error = %err, "websocket write failed");
                            break CloseReason::abnormal();
                        }
                        continue;
                    }
                    Some(Outgoing::Close(reason)) => reason,
                    None => {
                        writers_gone = true;
                        CloseReason::normal()
                    }
                };
                if closing.is_some() {
                    continue;
                }
                if sink.send(WsMessage::Close(Some(reason.to_frame()))).await.is_err() {
                    break reason;
                }
                closing = Some(reason);
                deadline = Some(Instant::now() + CLOSE_TIMEOUT);
            },
            incoming = stream.next() => match incoming {
                // Data after our close frame has nobody left to read it
                Some(Ok(WsMessage::Text(_) | WsMessage::Binary(_))) if closing.is_some() => {}
                Some(Ok(WsMessage::Text(text))) => {
                    events.on_message(Message::Text(text.as_str().to_owned()));
                }
                Some(Ok(WsMessage::Binary(data))) => events.on_message(Message::Binary(data)),
                // Pongs to pings are queued by the protocol layer
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    break match (closing.take(), frame) {
                        (Some(ours), _) => ours,
                        (None, Some(frame)) => {
                            CloseReason::new(u16::from(frame.code), frame.reason.as_str())
                        }
                        (None, None) => CloseReason::no_status(),
                    };
                }
                Some(Err(tungstenite::Error::Utf8 { .. })) => {
                    let reason = CloseReason::invalid_payload();
                    let _ = sink.send(WsMessage::Close(Some(reason.to_frame()))).await;
                    break reason;
                }
                Some(Err(err)) => {
                    debug!(socket = id, error = %err, "websocket read failed");
                    break closing.take().unwrap_or_else(CloseReason::abnormal);
                }
                None => break closing.take().unwrap_or_else(CloseReason::abnormal),
            },
            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                debug!(socket = id, "close handshake timed out");
                break closing.take().unwrap_or_else(CloseReason::abnormal);
            }
        }
    };

    // Flushes the close echo when the peer initiated
    let _ = sink.close().await;
    debug!(socket = id, code = reason.code, "websocket closed");
    events.on_close(reason);
}

/// Compute `Sec-WebSocket-Accept` for a client key
pub fn accept_key(client_key: &str) -> String {
    tungstenite::handshake::derive_accept_key(client_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key() {
        // Test vector from RFC 6455
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn test_pair_records_writes() {
        let (socket, mut rx) = NativeSocket::pair();
        socket.send("hi").unwrap();
        socket.send(Bytes::from_static(b"\x01")).unwrap();
        socket.close(1000, "bye").unwrap();

        assert_eq!(rx.recv().await, Some(Outgoing::Message(Message::Text("hi".into()))));
        assert_eq!(
            rx.recv().await,
            Some(Outgoing::Message(Message::Binary(Bytes::from_static(b"\x01"))))
        );
        assert_eq!(rx.recv().await, Some(Outgoing::Close(CloseReason::new(1000, "bye"))));
    }

    #[test]
    fn test_send_after_drop_fails() {
        let (socket, rx) = NativeSocket::pair();
        drop(rx);
        assert!(socket.is_closed());
        assert!(matches!(socket.send("late"), Err(Error::SocketClosed)));
    }
}
