//! WebSocket client socket and event loop.
//!
//! # Event Loop
//!
//! After the handshake the socket spawns a tokio task that handles:
//!
//! - Incoming frames (text, binary, ping/pong, close)
//! - Outgoing commands (`Send`, `Close`) in FIFO order
//! - Exactly one `on_close` when the loop ends

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Once};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SocketSerial;

use super::SocketEvents;

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type ClientSink = futures_util::stream::SplitSink<ClientStream, Message>;

// ============================================================================
// TLS
// ============================================================================

/// Installs the process-wide rustls provider used for `wss`.
///
/// A host cannot do this across the C boundary, and rustls panics on the
/// first TLS handshake without one. An already installed provider is kept.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("Keeping previously installed crypto provider");
        }
    });
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send one text frame.
    Send(String),
    /// Send a close frame and stop without waiting for the peer.
    Close,
}

// ============================================================================
// Socket
// ============================================================================

/// Handle to one open WebSocket connection.
///
/// Cloning is cheap; all clones feed the same event loop. Commands are
/// non-blocking and are written in the order they were issued.
#[derive(Clone)]
pub struct Socket {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Tag identifying this socket.
    serial: SocketSerial,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("serial", &self.serial)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Socket {
    /// Connects to `uri` and starts the event loop.
    ///
    /// On success `events.on_open` has already been called with a clone of
    /// the returned socket. No callback fires on failure; the caller reports
    /// the error.
    ///
    /// # Arguments
    ///
    /// * `uri` - `ws://` or `wss://` endpoint
    /// * `subprotocol` - Value for `Sec-WebSocket-Protocol`, if any
    /// * `events` - Callback sink for this socket
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `subprotocol` is not a valid header value
    /// - [`Error::WebSocket`] if the request is invalid
    /// - [`Error::Connection`] if the TCP, TLS or WebSocket handshake fails
    pub async fn connect(
        uri: &str,
        subprotocol: Option<&str>,
        events: Arc<dyn SocketEvents>,
    ) -> Result<Self> {
        let mut request = uri.into_client_request()?;

        if let Some(protocol) = subprotocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| Error::config(format!("Invalid subprotocol '{protocol}': {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        install_crypto_provider();

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let socket = Self {
            command_tx,
            serial: SocketSerial::next(),
        };

        debug!(
            serial = %socket.serial,
            status = %response.status(),
            "WebSocket handshake completed"
        );

        // on_open must be queued before the loop can deliver any frame.
        events.on_open(socket.clone());

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            socket.serial,
            events,
        ));

        Ok(socket)
    }

    /// Returns this socket's serial.
    #[inline]
    #[must_use]
    pub fn serial(&self) -> SocketSerial {
        self.serial
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(text.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Queues a forced close.
    ///
    /// A close frame is written and the loop stops without waiting for the
    /// peer's reply. `on_close` follows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn close(&self) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Close)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: ClientStream,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        serial: SocketSerial,
        events: Arc<dyn SocketEvents>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            events.on_text(text.as_str().to_owned());
                        }

                        Some(Ok(Message::Binary(data))) => {
                            match std::str::from_utf8(&data) {
                                Ok(text) => events.on_text(text.to_owned()),
                                Err(e) => events.on_decode_error(Error::from(e)),
                            }
                        }

                        Some(Ok(Message::Ping(_))) => events.on_ping(),

                        Some(Ok(Message::Pong(_))) => events.on_pong(),

                        Some(Ok(Message::Close(frame))) => {
                            debug!(%serial, ?frame, "WebSocket closed by remote");
                            // Flushes the close reply tungstenite queued.
                            let _ = ws_write.close().await;
                            break;
                        }

                        Some(Ok(Message::Frame(_))) => {}

                        Some(Err(e)) => {
                            warn!(%serial, error = %e, "WebSocket error");
                            events.on_exception(Error::WebSocket(e));
                            break;
                        }

                        None => {
                            debug!(%serial, "WebSocket stream ended");
                            break;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send(text)) => {
                            if let Err(e) = Self::write_text(&mut ws_write, text).await {
                                warn!(%serial, error = %e, "WebSocket write failed");
                                events.on_exception(e);
                                break;
                            }
                        }

                        Some(SocketCommand::Close) => {
                            debug!(%serial, "Close command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(%serial, "Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Rejects commands issued from here on.
        command_rx.close();

        events.on_close(serial);

        debug!(%serial, "Event loop terminated");
    }

    async fn write_text(ws_write: &mut ClientSink, text: String) -> Result<()> {
        let len = text.len();
        ws_write.send(Message::Text(text.into())).await?;
        trace!(len, "Text frame sent");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Open,
        Text(String),
        DecodeError,
        Close,
        Exception,
    }

    struct Recorder(mpsc::UnboundedSender<Seen>);

    impl SocketEvents for Recorder {
        fn on_open(&self, _socket: Socket) {
            let _ = self.0.send(Seen::Open);
        }
        fn on_text(&self, text: String) {
            let _ = self.0.send(Seen::Text(text));
        }
        fn on_decode_error(&self, _error: Error) {
            let _ = self.0.send(Seen::DecodeError);
        }
        fn on_close(&self, _serial: SocketSerial) {
            let _ = self.0.send(Seen::Close);
        }
        fn on_exception(&self, _error: Error) {
            let _ = self.0.send(Seen::Exception);
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    /// Accepts one client, sends `frames`, then echoes until the client leaves.
    async fn serve_once(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            for frame in frames {
                ws.send(frame).await.expect("server send");
            }
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        format!("ws://127.0.0.1:{port}")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_then_text_then_close() {
        let uri = serve_once(vec![Message::Text("hello".into())]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let socket = Socket::connect(&uri, None, Arc::new(Recorder(tx)))
            .await
            .expect("connect");

        assert_eq!(next(&mut rx).await, Seen::Open);
        assert_eq!(next(&mut rx).await, Seen::Text("hello".into()));

        socket.close().expect("close");
        assert_eq!(next(&mut rx).await, Seen::Close);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_utf8_binary_is_decode_error() {
        let uri = serve_once(vec![
            Message::Binary(vec![0xff, 0xfe].into()),
            Message::Binary(b"ok".to_vec().into()),
        ])
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _socket = Socket::connect(&uri, None, Arc::new(Recorder(tx)))
            .await
            .expect("connect");

        assert_eq!(next(&mut rx).await, Seen::Open);
        assert_eq!(next(&mut rx).await, Seen::DecodeError);
        assert_eq!(next(&mut rx).await, Seen::Text("ok".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_send_is_echoed_in_order() {
        let uri = serve_once(Vec::new()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let socket = Socket::connect(&uri, None, Arc::new(Recorder(tx)))
            .await
            .expect("connect");
        assert_eq!(next(&mut rx).await, Seen::Open);

        for i in 0..20 {
            socket.send(format!("m{i}")).expect("send");
        }
        for i in 0..20 {
            assert_eq!(next(&mut rx).await, Seen::Text(format!("m{i}")));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_close_fires_close_once() {
        let uri = serve_once(vec![Message::Close(None)]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let socket = Socket::connect(&uri, None, Arc::new(Recorder(tx)))
            .await
            .expect("connect");

        assert_eq!(next(&mut rx).await, Seen::Open);
        assert_eq!(next(&mut rx).await, Seen::Close);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(socket.is_closed());
        assert!(socket.send("late").is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_fires_nothing() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = Socket::connect(
            &format!("ws://127.0.0.1:{port}"),
            None,
            Arc::new(Recorder(tx)),
        )
        .await;

        assert!(matches!(result, Err(Error::Connection { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wss_handshake_failure_is_connection_error() {
        // Plain TCP peer: the TLS handshake cannot complete.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = Socket::connect(
            &format!("wss://127.0.0.1:{port}/"),
            None,
            Arc::new(Recorder(tx)),
        )
        .await;

        assert!(matches!(result, Err(Error::Connection { .. })), "{result:?}");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_subprotocol_is_config_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result =
            Socket::connect("ws://127.0.0.1:1", Some("bad\nvalue"), Arc::new(Recorder(tx))).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
