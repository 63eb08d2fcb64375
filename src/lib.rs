//! Realtime Bridge - WebSocket relay across a C ABI boundary.
//!
//! This library lets a host runtime (a game engine's native layer, and the
//! managed scripting layer behind it) use WebSockets without a networking
//! stack of its own. The host creates connections by integer handle and
//! receives their lifecycle events through five registered callbacks.
//!
//! # Architecture
//!
//! - **Transport**: `tokio-tungstenite` does the handshake, framing, TLS and
//!   ping/pong. Each [`Socket`] runs one event loop task.
//! - **Relay**: a [`ConnectionRelay`] turns socket events into boundary
//!   notifications and owns the socket reference.
//! - **Dispatcher**: every notification and every outbound operation runs on
//!   one serialized [`Dispatcher`], so the host sees calls one at a time in
//!   the order they were posted.
//!
//! Nothing fails toward the host: malformed URIs, failed handshakes,
//! undecodable frames and transport errors all become notifications.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use realtime_bridge::{Boundary, BridgeConfig, ConnectionId, RelayPool, Result};
//!
//! struct Printer;
//!
//! impl Boundary for Printer {
//!     fn opened(&self, id: ConnectionId) -> i32 {
//!         println!("{id} opened");
//!         0
//!     }
//!     fn closed(&self, id: ConnectionId) {
//!         println!("{id} closed");
//!     }
//!     fn message(&self, id: ConnectionId, text: &str) {
//!         println!("{id} <- {text}");
//!     }
//!     fn log(&self, id: ConnectionId, text: &str) {
//!         println!("{id} log {text}");
//!     }
//!     fn error(&self, id: ConnectionId, text: &str) {
//!         println!("{id} {text}");
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let pool = RelayPool::start(BridgeConfig::default(), Arc::new(Printer))?;
//!
//!     let id = pool.create()?;
//!     pool.open(id, "wss://echo.example.com/socket");
//!     pool.send(id, "hello");
//!     pool.close(id);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Boundary trait, handle table, configuration, C ABI |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe handle wrappers |
//! | [`relay`] | [`ConnectionRelay`], [`Dispatcher`], [`RelayOptions`] |
//! | [`transport`] | WebSocket socket and event loop |

// ============================================================================
// Modules
// ============================================================================

/// Native boundary: callbacks, handle table, configuration, C ABI.
pub mod bridge;

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Connection relays and the serialized dispatcher.
pub mod relay;

/// WebSocket transport layer.
pub mod transport;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{Boundary, BridgeConfig, BridgeConfigBuilder, NativeBoundary, RelayPool};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, SocketSerial};

// Relay types
pub use relay::{ConnectionRelay, DispatchMode, Dispatcher, RelayOptions};

// Transport types
pub use transport::{Socket, SocketEvents};
