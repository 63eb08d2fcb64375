//! One WebSocket connection relayed to the native boundary.
//!
//! # Notifications
//!
//! | Socket event | Boundary call |
//! |--------------|---------------|
//! | handshake done | `opened(id)` |
//! | text frame | `message(id, text)` |
//! | undecodable frame | `error(id, "Error: ...")` |
//! | closed (any cause) | `closed(id)` |
//! | ping / pong | none |
//! | transport exception | `message(id, description)` |
//!
//! Malformed URIs and failed handshakes become `error(id, "Error: ...")`.
//! Nothing is ever returned to the caller as a failure.
//!
//! `closed` is only forwarded for the socket the relay currently holds. A
//! socket replaced by a second `open` is closed silently.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::bridge::Boundary;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, SocketSerial};
use crate::transport::{Socket, SocketEvents};

use super::dispatcher::Dispatcher;
use super::options::RelayOptions;

// ============================================================================
// Constants
// ============================================================================

/// Prefix for text routed through the error helper.
const ERROR_PREFIX: &str = "Error: ";

// ============================================================================
// ConnectionRelay
// ============================================================================

/// Owns one WebSocket connection and forwards its events.
///
/// `open`, `send` and `close` return immediately. Results arrive later as
/// boundary notifications posted on the [`Dispatcher`].
///
/// `send` and `close` with no socket held are silent no-ops, including
/// while a connection attempt is still in flight.
///
/// Dropping the relay closes its socket; the resulting `closed` notification
/// is still delivered.
pub struct ConnectionRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    id: ConnectionId,
    runtime: Handle,
    dispatcher: Dispatcher,
    boundary: Arc<dyn Boundary>,
    options: RelayOptions,
    /// Written only from dispatcher jobs.
    socket: Arc<Mutex<Option<Socket>>>,
    /// Set when the owning relay is dropped.
    released: Arc<AtomicBool>,
}

impl fmt::Debug for ConnectionRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRelay")
            .field("id", &self.inner.id)
            .field("socket", &*self.inner.socket.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionRelay - Public API
// ============================================================================

impl ConnectionRelay {
    /// Creates a relay with a fresh handle. Has no other side effects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlesExhausted`] if no handle is left.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime that drives socket I/O
    /// * `dispatcher` - Serialized context for notifications and socket ops
    /// * `boundary` - Notification receiver
    /// * `options` - Per-connection options
    pub fn create(
        runtime: Handle,
        dispatcher: Dispatcher,
        boundary: Arc<dyn Boundary>,
        options: RelayOptions,
    ) -> Result<Self> {
        let id = ConnectionId::next()?;
        trace!(%id, "Relay created");

        Ok(Self {
            inner: Arc::new(RelayInner {
                id,
                runtime,
                dispatcher,
                boundary,
                options,
                socket: Arc::new(Mutex::new(None)),
                released: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    /// Returns this relay's handle.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns `true` while a socket is held.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.socket.lock().is_some()
    }

    /// Starts connecting to `uri`.
    ///
    /// A malformed URI (empty, no scheme, or a scheme other than `ws`/`wss`)
    /// is reported as one `error` notification. No retry is attempted.
    ///
    /// Opening while a socket is held replaces it once the new handshake
    /// completes; the replaced socket produces no `closed`.
    pub fn open(&self, uri: &str) {
        let url = match parse_uri(uri) {
            Ok(url) => url,
            Err(e) => {
                self.inner.error(&e);
                return;
            }
        };

        self.inner.log(&format!("connecting to {url}"));

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let events: Arc<dyn SocketEvents> = Arc::clone(&inner) as Arc<dyn SocketEvents>;
            let subprotocol = inner.options.subprotocol.clone();
            let connect = Socket::connect(url.as_str(), subprotocol.as_deref(), events);

            match AssertUnwindSafe(connect).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => inner.error(&e),
                Err(_) => inner.error(&Error::connection("connect task panicked")),
            }
        });
    }

    /// Schedules a forced close of the current socket.
    ///
    /// No-op when no socket is held.
    pub fn close(&self) {
        if self.inner.socket.lock().is_none() {
            trace!(id = %self.inner.id, "Close ignored: no socket");
            return;
        }

        self.inner.log("closing");

        let id = self.inner.id;
        let slot = Arc::clone(&self.inner.socket);
        self.inner.post(move || {
            if let Some(socket) = slot.lock().as_ref()
                && let Err(e) = socket.close()
            {
                debug!(%id, error = %e, "Close on stopped socket");
            }
        });
    }

    /// Schedules sending one text message.
    ///
    /// No-op when no socket is held: the message is dropped.
    pub fn send(&self, message: impl Into<String>) {
        if self.inner.socket.lock().is_none() {
            trace!(id = %self.inner.id, "Send dropped: no socket");
            return;
        }

        let message = message.into();
        let id = self.inner.id;
        let slot = Arc::clone(&self.inner.socket);
        self.inner.post(move || {
            if let Some(socket) = slot.lock().as_ref()
                && let Err(e) = socket.send(message)
            {
                debug!(%id, error = %e, "Send on stopped socket");
            }
        });
    }
}

impl Drop for ConnectionRelay {
    fn drop(&mut self) {
        self.inner.released.store(true, Ordering::SeqCst);

        // The event loop holds the inner state; closing ends that cycle.
        if let Some(socket) = self.inner.socket.lock().as_ref() {
            let _ = socket.close();
        }
    }
}

// ============================================================================
// RelayInner - Forwarding Helpers
// ============================================================================

impl RelayInner {
    /// Posts a job, logging if the dispatcher is gone.
    fn post(&self, job: impl FnOnce() + Send + 'static) {
        if let Err(e) = self.dispatcher.post(job) {
            warn!(id = %self.id, error = %e, "Job dropped");
        }
    }

    /// Diagnostic line. Always written to the local sink; forwarded to the
    /// boundary only when `forward_diagnostics` is set.
    fn log(&self, text: &str) {
        debug!(target: "realtime_bridge", id = %self.id, "{text}");

        if !self.options.forward_diagnostics {
            return;
        }

        let id = self.id;
        let boundary = Arc::clone(&self.boundary);
        let text = text.to_owned();
        self.post(move || boundary.log(id, &text));
    }

    /// Error line, forwarded with the `"Error: "` prefix.
    fn error(&self, error: &Error) {
        if error.is_caller_error() {
            warn!(target: "realtime_bridge", id = %self.id, "{error}");
        } else {
            error!(target: "realtime_bridge", id = %self.id, "{error}");
        }

        let id = self.id;
        let boundary = Arc::clone(&self.boundary);
        let text = format!("{ERROR_PREFIX}{error}");
        self.post(move || boundary.error(id, &text));
    }
}

// ============================================================================
// RelayInner - Socket Events
// ============================================================================

impl SocketEvents for RelayInner {
    fn on_open(&self, socket: Socket) {
        let id = self.id;
        info!(%id, serial = %socket.serial(), "Connection opened");

        let boundary = Arc::clone(&self.boundary);
        let slot = Arc::clone(&self.socket);
        let released = Arc::clone(&self.released);
        self.post(move || {
            if released.load(Ordering::SeqCst) {
                // Relay dropped while connecting.
                let _ = socket.close();
                return;
            }
            if let Some(previous) = slot.lock().replace(socket) {
                trace!(%id, serial = %previous.serial(), "Replacing socket");
                let _ = previous.close();
            }
            let ack = boundary.opened(id);
            trace!(%id, ack, "Opened delivered");
        });

        self.log("connected");
    }

    fn on_text(&self, text: String) {
        let id = self.id;
        let boundary = Arc::clone(&self.boundary);
        self.post(move || boundary.message(id, &text));
    }

    fn on_decode_error(&self, error: Error) {
        self.error(&error);
    }

    fn on_close(&self, serial: SocketSerial) {
        let id = self.id;
        info!(%id, %serial, "Connection closed");

        let boundary = Arc::clone(&self.boundary);
        let slot = Arc::clone(&self.socket);
        self.post(move || {
            // on_open is queued before any close of the same socket, so a
            // mismatch means this socket was replaced or never stored.
            let current = {
                let mut socket = slot.lock();
                let current = socket.as_ref().is_some_and(|s| s.serial() == serial);
                if current {
                    *socket = None;
                }
                current
            };

            if current {
                boundary.closed(id);
            } else {
                trace!(%id, %serial, "Closed dropped for replaced socket");
            }
        });
    }

    fn on_exception(&self, error: Error) {
        let id = self.id;
        let text = error.to_string();
        warn!(%id, error = %text, "Transport exception");

        // Exceptions travel on the message channel; the managed layer
        // depends on it.
        let boundary = Arc::clone(&self.boundary);
        self.post(move || boundary.message(id, &text));
    }
}

// ============================================================================
// URI Parsing
// ============================================================================

/// Parses and checks a connection URI.
fn parse_uri(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::invalid_uri(raw, e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::invalid_uri(
                raw,
                format!("unsupported scheme '{other}', expected ws or wss"),
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_uri(raw, "missing host"));
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
