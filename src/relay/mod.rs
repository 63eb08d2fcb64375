//! Connection relays and the serialized context they report on.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionRelay`] | One WebSocket connection forwarded to a [`Boundary`](crate::bridge::Boundary) |
//! | [`Dispatcher`] | FIFO job queue standing in for the host's UI thread |
//! | [`RelayOptions`] | Per-connection options |

// ============================================================================
// Submodules
// ============================================================================

/// Relay implementation and socket event adapters.
pub mod core;

/// Serialized execution context.
pub mod dispatcher;

/// Per-connection options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::ConnectionRelay;
pub use dispatcher::{DispatchMode, Dispatcher, Job};
pub use options::RelayOptions;
