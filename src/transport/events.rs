//! Capability set registered against a socket.

// ============================================================================
// Imports
// ============================================================================

use crate::error::Error;
use crate::identifiers::SocketSerial;

use super::Socket;

// ============================================================================
// SocketEvents
// ============================================================================

/// Callbacks invoked by a [`Socket`]'s event loop.
///
/// Implementations run on tokio worker threads and must not block; the relay
/// implementation only posts work onto its dispatcher.
///
/// Ordering guarantees:
///
/// - `on_open` is called before the event loop starts, so it precedes every
///   other callback for the same socket.
/// - `on_close` is called exactly once, after every other callback.
pub trait SocketEvents: Send + Sync + 'static {
    /// Handshake completed.
    fn on_open(&self, socket: Socket);

    /// A text frame, or a binary frame holding valid UTF-8.
    fn on_text(&self, text: String);

    /// A binary frame that could not be extracted as text.
    fn on_decode_error(&self, error: Error);

    /// The event loop ended, for any reason.
    fn on_close(&self, serial: SocketSerial);

    /// Transport-level keepalive. Ignored unless overridden.
    fn on_ping(&self) {}

    /// Transport-level keepalive. Ignored unless overridden.
    fn on_pong(&self) {}

    /// Read or write failure on an open socket. `on_close` follows.
    fn on_exception(&self, error: Error);
}
