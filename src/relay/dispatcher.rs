//! Serialized execution context.
//!
//! Every boundary callback and every mutation of a relay's socket slot runs
//! here, one job at a time, in the order jobs were posted. This is what
//! keeps the native side single-threaded without locks on its end.
//!
//! # Modes
//!
//! | Mode | Who runs jobs |
//! |------|---------------|
//! | [`DispatchMode::Dedicated`] | A named OS thread owned by the dispatcher |
//! | [`DispatchMode::Manual`] | The host, by calling [`Dispatcher::pump`] from its main loop |

// ============================================================================
// Imports
// ============================================================================

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Name of the dedicated dispatch thread.
const DISPATCH_THREAD_NAME: &str = "realtime-bridge-ui";

// ============================================================================
// Types
// ============================================================================

/// A unit of work posted to the dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// DispatchMode
// ============================================================================

/// Where posted jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchMode {
    /// A dedicated thread drains the queue.
    #[default]
    Dedicated,
    /// Jobs wait until the host calls [`Dispatcher::pump`].
    Manual,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Handle to a serialized job queue.
///
/// Cloning is cheap. In dedicated mode the thread exits once every clone
/// has been dropped and the queue is empty.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Queue feeding the consumer.
    job_tx: mpsc::UnboundedSender<Job>,
    /// Consumer side, held here only in manual mode.
    manual_rx: Option<Mutex<mpsc::UnboundedReceiver<Job>>>,
    mode: DispatchMode,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the dedicated thread cannot be spawned.
    pub fn new(mode: DispatchMode) -> Result<Self> {
        match mode {
            DispatchMode::Dedicated => Self::dedicated(),
            DispatchMode::Manual => Ok(Self::manual()),
        }
    }

    /// Creates a dispatcher backed by its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn dedicated() -> Result<Self> {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                debug!("Dispatch thread started");
                while let Some(job) = job_rx.blocking_recv() {
                    run_job(job);
                }
                debug!("Dispatch thread terminated");
            })?;

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                job_tx,
                manual_rx: None,
                mode: DispatchMode::Dedicated,
            }),
        })
    }

    /// Creates a dispatcher drained by [`pump`](Self::pump).
    #[must_use]
    pub fn manual() -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(DispatcherInner {
                job_tx,
                manual_rx: Some(Mutex::new(job_rx)),
                mode: DispatchMode::Manual,
            }),
        }
    }

    /// Returns the dispatch mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.inner.mode
    }

    /// Queues a job. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatcherClosed`] if the consumer is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.inner
            .job_tx
            .send(Box::new(job))
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Runs the jobs queued at the time of the call, on the calling thread.
    ///
    /// Jobs posted while pumping wait for the next call. Returns the number
    /// of jobs run; always 0 in dedicated mode, and 0 when called
    /// re-entrantly from inside a job.
    pub fn pump(&self) -> usize {
        let Some(manual_rx) = &self.inner.manual_rx else {
            return 0;
        };
        let Some(mut job_rx) = manual_rx.try_lock() else {
            trace!("Re-entrant pump ignored");
            return 0;
        };

        let pending = job_rx.len();
        let mut ran = 0;
        while ran < pending {
            match job_rx.try_recv() {
                Ok(job) => {
                    run_job(job);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }
}

/// Runs a job, containing any panic so the queue keeps draining.
fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(%reason, "Dispatched job panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
