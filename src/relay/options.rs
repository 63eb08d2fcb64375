//! Per-connection relay options.
//!
//! # Example
//!
//! ```
//! use realtime_bridge::RelayOptions;
//!
//! let options = RelayOptions::new()
//!     .with_subprotocol("TLSv1.2")
//!     .with_diagnostics();
//!
//! assert!(options.forward_diagnostics);
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// RelayOptions
// ============================================================================

/// Options applied to every connection a relay opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayOptions {
    /// Value sent as `Sec-WebSocket-Protocol` during the handshake.
    ///
    /// The server must echo it back or the handshake fails.
    pub subprotocol: Option<String>,

    /// Forward lifecycle diagnostics to the native `log` callback.
    ///
    /// They are always written to the local `tracing` sink.
    pub forward_diagnostics: bool,
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subprotocol: None,
            forward_diagnostics: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayOptions {
    /// Sets the handshake subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Enables forwarding of lifecycle diagnostics.
    #[inline]
    #[must_use]
    pub fn with_diagnostics(mut self) -> Self {
        self.forward_diagnostics = true;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RelayOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the subprotocol is empty or contains
    /// characters not allowed in a header token.
    pub fn validate(&self) -> Result<()> {
        if let Some(protocol) = &self.subprotocol {
            if protocol.is_empty() {
                return Err(Error::config("Subprotocol must not be empty"));
            }
            if !protocol
                .bytes()
                .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
            {
                return Err(Error::config(format!(
                    "Subprotocol '{protocol}' is not a valid token"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
