//! WebSocket transport layer.
//!
//! Wraps `tokio-tungstenite`: handshake, framing, TLS and ping/pong are
//! handled there. This layer only turns the stream into a command channel
//! plus a set of callbacks.
//!
//! ```text
//! ┌──────────────────┐   SocketCommand    ┌─────────────────┐    WebSocket    ┌────────┐
//! │ Socket (handle)  │───────────────────►│   event loop    │◄───────────────►│  peer  │
//! └──────────────────┘                    │  (tokio task)   │                 └────────┘
//!                                         └────────┬────────┘
//!                                                  │ SocketEvents
//!                                                  ▼
//!                                          ConnectionRelay
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `events` | The callback trait registered against a socket |
//! | `socket` | Connection handle and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Callback trait registered against a socket.
pub mod events;

/// WebSocket client socket and event loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use events::SocketEvents;
pub use socket::Socket;
