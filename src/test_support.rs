//! Shared fixtures for unit tests: a recording boundary and local
//! WebSocket peers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::bridge::Boundary;
use crate::identifiers::ConnectionId;
use crate::relay::Dispatcher;

// ============================================================================
// RecordingBoundary
// ============================================================================

/// One boundary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    Opened(ConnectionId),
    Closed(ConnectionId),
    Message(ConnectionId, String),
    Log(ConnectionId, String),
    Error(ConnectionId, String),
}

impl Note {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Opened(id)
            | Self::Closed(id)
            | Self::Message(id, _)
            | Self::Log(id, _)
            | Self::Error(id, _) => *id,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log(..))
    }
}

/// Boundary that records every call in order.
#[derive(Default)]
pub struct RecordingBoundary {
    notes: Mutex<Vec<Note>>,
}

impl RecordingBoundary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().clone()
    }

    /// Notes other than diagnostics.
    pub fn events(&self) -> Vec<Note> {
        self.notes().into_iter().filter(|n| !n.is_log()).collect()
    }

    /// Pumps `dispatcher` until `done` holds for the recorded events.
    pub async fn wait_for(
        &self,
        dispatcher: &Dispatcher,
        done: impl Fn(&[Note]) -> bool,
    ) -> Vec<Note> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            dispatcher.pump();
            let events = self.events();
            if done(&events) {
                return events;
            }
            assert!(Instant::now() < deadline, "timed out, saw {events:?}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Boundary for RecordingBoundary {
    fn opened(&self, id: ConnectionId) -> i32 {
        self.notes.lock().push(Note::Opened(id));
        1
    }

    fn closed(&self, id: ConnectionId) {
        self.notes.lock().push(Note::Closed(id));
    }

    fn message(&self, id: ConnectionId, text: &str) {
        self.notes.lock().push(Note::Message(id, text.to_owned()));
    }

    fn log(&self, id: ConnectionId, text: &str) {
        self.notes.lock().push(Note::Log(id, text.to_owned()));
    }

    fn error(&self, id: ConnectionId, text: &str) {
        self.notes.lock().push(Note::Error(id, text.to_owned()));
    }
}

// ============================================================================
// Peers
// ============================================================================

/// What a test peer does once a client connects.
#[derive(Debug, Clone)]
pub enum PeerScript {
    /// Echo text frames, report each one on the returned channel.
    Echo,
    /// Send a close frame right away.
    CloseImmediately,
    /// Write a frame with reserved bits set, which clients must reject.
    Garbage,
    /// Send one binary frame that is not UTF-8, then echo.
    InvalidUtf8,
}

/// Binds a one-shot peer on localhost. Returns its URI and a channel of the
/// text frames it received.
pub async fn spawn_peer(script: PeerScript) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("upgrade");

        match script {
            PeerScript::Echo => {
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() {
                        let text = msg.to_text().unwrap_or_default().to_owned();
                        let _ = seen_tx.send(text);
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            }
            PeerScript::CloseImmediately => {
                let _ = ws.close(None).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
            PeerScript::Garbage => {
                let _ = ws.get_mut().write_all(&[0xF1, 0x00]).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
            PeerScript::InvalidUtf8 => {
                let _ = ws.send(Message::Binary(vec![0xFF, 0xFE, 0xFD].into())).await;
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (format!("ws://127.0.0.1:{port}"), seen_rx)
}

/// Binds a peer that accepts one TCP connection and drops it without
/// speaking TLS or HTTP.
pub async fn spawn_silent_peer() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    port
}

/// Returns a localhost port with no listener.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}
