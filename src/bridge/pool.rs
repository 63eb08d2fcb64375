//! Table of live relays keyed by handle.
//!
//! The native side only ever holds integer handles; the pool maps them back
//! to relays and owns everything those relays share.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 RelayPool                 │
//! │  tokio runtime (socket I/O)               │
//! │  Dispatcher    (serialized callbacks)     │
//! │  Boundary      (native callbacks)         │
//! │  ┌─────────────────────────────────────┐  │
//! │  │ ConnectionId=0 → ConnectionRelay    │  │
//! │  │ ConnectionId=1 → ConnectionRelay    │  │
//! │  └─────────────────────────────────────┘  │
//! └───────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::relay::{ConnectionRelay, Dispatcher, RelayOptions};

use super::Boundary;
use super::config::BridgeConfig;

// ============================================================================
// Constants
// ============================================================================

/// Name given to tokio I/O worker threads.
const IO_THREAD_NAME: &str = "realtime-bridge-io";

// ============================================================================
// RelayPool
// ============================================================================

/// Owns the shared runtime, dispatcher and boundary, and every live relay.
///
/// Thread-safe. Operations on unknown handles log a warning and do nothing.
pub struct RelayPool {
    /// Runtime owned by the pool, if it created one.
    runtime: Option<Runtime>,

    /// Handle used to spawn socket tasks.
    handle: Handle,

    /// Serialized context shared by all relays.
    dispatcher: Dispatcher,

    /// Notification receiver shared by all relays.
    boundary: Arc<dyn Boundary>,

    /// Options applied to new relays.
    options: RelayOptions,

    /// Live relays by handle.
    relays: RwLock<FxHashMap<ConnectionId, Arc<ConnectionRelay>>>,
}

impl std::fmt::Debug for RelayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPool")
            .field("dispatcher", &self.dispatcher)
            .field("options", &self.options)
            .field("relay_count", &self.relay_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RelayPool - Constructor
// ============================================================================

impl RelayPool {
    /// Starts a pool with its own multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if `config` is invalid
    /// - [`Error::Io`](crate::Error::Io) if the runtime or dispatch thread
    ///   cannot be started
    pub fn start(config: BridgeConfig, boundary: Arc<dyn Boundary>) -> Result<Self> {
        config.validate()?;

        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(IO_THREAD_NAME);
        if let Some(count) = config.worker_threads {
            builder.worker_threads(count);
        }
        let runtime = builder.build()?;
        let handle = runtime.handle().clone();
        let dispatcher = Dispatcher::new(config.dispatch)?;

        info!(
            dispatch = ?config.dispatch,
            worker_threads = ?config.worker_threads,
            "RelayPool started"
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            dispatcher,
            boundary,
            options: config.relay,
            relays: RwLock::new(FxHashMap::default()),
        })
    }

    /// Creates a pool on an existing runtime.
    #[must_use]
    pub fn with_handle(
        handle: Handle,
        dispatcher: Dispatcher,
        boundary: Arc<dyn Boundary>,
        options: RelayOptions,
    ) -> Self {
        Self {
            runtime: None,
            handle,
            dispatcher,
            boundary,
            options,
            relays: RwLock::new(FxHashMap::default()),
        }
    }
}

// ============================================================================
// RelayPool - Public API
// ============================================================================

impl RelayPool {
    /// Creates a relay and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlesExhausted`](crate::Error::HandlesExhausted)
    /// if no handle is left.
    pub fn create(&self) -> Result<ConnectionId> {
        let relay = ConnectionRelay::create(
            self.handle.clone(),
            self.dispatcher.clone(),
            Arc::clone(&self.boundary),
            self.options.clone(),
        )?;
        let id = relay.id();

        self.relays.write().insert(id, Arc::new(relay));
        debug!(%id, "Relay added to pool");

        Ok(id)
    }

    /// Starts connecting relay `id` to `uri`.
    pub fn open(&self, id: ConnectionId, uri: &str) {
        if let Some(relay) = self.get(id) {
            relay.open(uri);
        }
    }

    /// Schedules a close of relay `id`'s socket.
    pub fn close(&self, id: ConnectionId) {
        if let Some(relay) = self.get(id) {
            relay.close();
        }
    }

    /// Schedules sending `text` on relay `id`.
    pub fn send(&self, id: ConnectionId, text: &str) {
        if let Some(relay) = self.get(id) {
            relay.send(text);
        }
    }

    /// Returns the relay's own handle, or `None` if it is unknown.
    #[must_use]
    pub fn get_id(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.get(id).map(|relay| relay.id())
    }

    /// Removes relay `id` and closes its socket.
    ///
    /// A pending `closed` notification for the handle is still delivered.
    pub fn release(&self, id: ConnectionId) {
        let removed = self.relays.write().remove(&id);

        if removed.is_some() {
            debug!(%id, "Relay removed from pool");
        } else {
            warn!(%id, "Release of unknown relay");
        }
    }

    /// Runs queued notifications on the calling thread (manual dispatch).
    pub fn pump(&self) -> usize {
        self.dispatcher.pump()
    }

    /// Returns the number of live relays.
    #[inline]
    #[must_use]
    pub fn relay_count(&self) -> usize {
        self.relays.read().len()
    }

    /// Releases every relay.
    pub fn shutdown(&self) {
        info!("RelayPool shutting down");

        let relays: Vec<_> = self.relays.write().drain().collect();
        let count = relays.len();
        drop(relays);

        info!(count, "RelayPool shutdown complete");
    }

    fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionRelay>> {
        let relay = self.relays.read().get(&id).cloned();
        if relay.is_none() {
            warn!(%id, "Unknown relay handle");
        }
        relay
    }
}

impl Drop for RelayPool {
    fn drop(&mut self) {
        self.relays.get_mut().clear();

        // Dropping a runtime from async context panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
