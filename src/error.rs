//! Error types for the realtime bridge.
//!
//! Errors never cross the C boundary. Every failure is caught where it
//! happens and turned into an `error` or `message` notification; this
//! enum exists so the Rust side can propagate with `?` until that point.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::InvalidUri`], [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::HandlesExhausted`] |
//! | Messages | [`Error::Decode`] |
//! | Dispatch | [`Error::DispatcherClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::str::Utf8Error;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a bridge configuration is invalid or applied too late.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection URI could not be parsed or has an unsupported scheme.
    #[error("Invalid URI '{uri}': {message}")]
    InvalidUri {
        /// The rejected URI as given by the caller.
        uri: String,
        /// Parse failure description.
        message: String,
    },

    /// WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The socket's event loop is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Every non-negative handle has been allocated.
    #[error("Connection handles exhausted")]
    HandlesExhausted,

    // ========================================================================
    // Message Errors
    // ========================================================================
    /// A received frame could not be extracted as text.
    #[error("Decode error: {0}")]
    Decode(#[from] Utf8Error),

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// The serialized execution context has shut down.
    #[error("Dispatcher closed")]
    DispatcherClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URI error.
    #[inline]
    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the error came from the caller's input rather
    /// than the network.
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidUri { .. } | Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
