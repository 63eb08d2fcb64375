//! Native boundary: the callback surface, the handle table, and the C ABI.
//!
//! ```text
//!  managed layer ──► native layer ──► RealtimeBridge_* (ffi) ──► RelayPool ──► ConnectionRelay
//!        ▲                                                                          │
//!        └──────────── Register*Delegate callbacks ◄── NativeBoundary ◄── Dispatcher ┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `boundary` | [`Boundary`] trait and [`NativeBoundary`] |
//! | `config` | [`BridgeConfig`] and its builder |
//! | `ffi` | `extern "C"` entry points |
//! | `pool` | [`RelayPool`] handle table |

// ============================================================================
// Submodules
// ============================================================================

/// Callback surface toward the native host.
pub mod boundary;

/// Bridge configuration.
pub mod config;

/// C ABI entry points.
pub mod ffi;

/// Table of live relays keyed by handle.
pub mod pool;

// ============================================================================
// Re-exports
// ============================================================================

pub use boundary::{Boundary, NativeBoundary};
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use pool::RelayPool;
