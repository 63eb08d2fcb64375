//! Bridge configuration.
//!
//! The host may pass a JSON document before the first connection is created:
//!
//! ```json
//! {
//!   "dispatch": "manual",
//!   "workerThreads": 2,
//!   "relay": { "subprotocol": "TLSv1.2", "forwardDiagnostics": true }
//! }
//! ```
//!
//! Every field is optional. Rust callers can use the builder instead:
//!
//! ```
//! use realtime_bridge::BridgeConfig;
//!
//! # fn example() -> realtime_bridge::Result<()> {
//! let config = BridgeConfig::builder()
//!     .manual_dispatch()
//!     .worker_threads(2)
//!     .diagnostics()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::relay::{DispatchMode, RelayOptions};

// ============================================================================
// BridgeConfig
// ============================================================================

/// Process-wide bridge settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Where notifications are delivered.
    pub dispatch: DispatchMode,

    /// Tokio worker threads for socket I/O. `None` uses tokio's default.
    pub worker_threads: Option<usize>,

    /// Options applied to every relay.
    pub relay: RelayOptions,
}

impl BridgeConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed or has unknown fields
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `worker_threads` is zero or the relay
    /// options are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) {
            return Err(Error::config("workerThreads must be greater than zero"));
        }
        self.relay.validate()
    }
}

// ============================================================================
// BridgeConfigBuilder
// ============================================================================

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default, Clone)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dispatch mode.
    #[inline]
    #[must_use]
    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    /// Delivers notifications only when the host pumps.
    #[inline]
    #[must_use]
    pub fn manual_dispatch(self) -> Self {
        self.dispatch(DispatchMode::Manual)
    }

    /// Sets the number of I/O worker threads.
    #[inline]
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = Some(count);
        self
    }

    /// Sets the handshake subprotocol.
    #[inline]
    #[must_use]
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.relay = self.config.relay.with_subprotocol(protocol);
        self
    }

    /// Forwards lifecycle diagnostics to the `log` callback.
    #[inline]
    #[must_use]
    pub fn diagnostics(mut self) -> Self {
        self.config.relay = self.config.relay.with_diagnostics();
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.dispatch, DispatchMode::Dedicated);
        assert!(config.worker_threads.is_none());
        assert_eq!(config.relay, RelayOptions::new());
    }

    #[test]
    fn test_from_json_full() {
        let config = BridgeConfig::from_json(
            r#"{
                "dispatch": "manual",
                "workerThreads": 2,
                "relay": { "subprotocol": "TLSv1.2", "forwardDiagnostics": true }
            }"#,
        )
        .expect("parse");

        assert_eq!(config.dispatch, DispatchMode::Manual);
        assert_eq!(config.worker_threads, Some(2));
        assert_eq!(config.relay.subprotocol.as_deref(), Some("TLSv1.2"));
        assert!(config.relay.forward_diagnostics);
    }

    #[test]
    fn test_from_json_empty_object() {
        assert_eq!(BridgeConfig::from_json("{}").expect("parse"), BridgeConfig::default());
    }

    #[test]
    fn test_from_json_rejects_unknown_field() {
        let err = BridgeConfig::from_json(r#"{"retries": 3}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_json_rejects_zero_workers() {
        let err = BridgeConfig::from_json(r#"{"workerThreads": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_chain() {
        let config = BridgeConfig::builder()
            .manual_dispatch()
            .worker_threads(4)
            .subprotocol("chat")
            .diagnostics()
            .build()
            .expect("build");

        assert_eq!(config.dispatch, DispatchMode::Manual);
        assert_eq!(config.worker_threads, Some(4));
        assert_eq!(config.relay, RelayOptions::new().with_subprotocol("chat").with_diagnostics());
    }

    #[test]
    fn test_builder_rejects_bad_subprotocol() {
        let result = BridgeConfig::builder().subprotocol("has space").build();
        assert!(result.is_err());
    }
}
