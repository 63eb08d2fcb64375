//! C ABI entry points.
//!
//! The host registers its five callbacks, then drives connections by handle:
//!
//! ```c
//! RegisterOpenedDelegate(on_opened);
//! RegisterMessageDelegate(on_message);
//! /* ... */
//! int id = RealtimeBridge_Create();
//! RealtimeBridge_Open(id, "wss://example.com/socket");
//! RealtimeBridge_Send(id, "hello");
//! RealtimeBridge_Close(id);
//! ```
//!
//! The pool starts lazily on the first call that needs it, using the
//! configuration passed to `RealtimeBridge_Configure` if any. No function
//! unwinds into the host; a panic is logged and the call returns its
//! failure value.

#![allow(non_snake_case)]

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::boundary::{NativeBoundary, NativeClosedDelegate, NativeOpenedDelegate, NativeTextDelegate};
use super::config::BridgeConfig;
use super::pool::RelayPool;

// ============================================================================
// Globals
// ============================================================================

/// Callbacks registered by the host.
static BOUNDARY: LazyLock<Arc<NativeBoundary>> = LazyLock::new(|| Arc::new(NativeBoundary::new()));

/// The process-wide pool, started on first use.
static POOL: OnceLock<RelayPool> = OnceLock::new();

/// Configuration to start the pool with. Also serializes pool startup.
static PENDING_CONFIG: Mutex<Option<BridgeConfig>> = Mutex::new(None);

/// Returned for failed calls that produce a handle or status.
const FAILURE: c_int = -1;

// ============================================================================
// Helpers
// ============================================================================

/// Returns the pool, starting it if needed.
fn pool() -> Option<&'static RelayPool> {
    if let Some(pool) = POOL.get() {
        return Some(pool);
    }

    let config = PENDING_CONFIG.lock();
    if let Some(pool) = POOL.get() {
        return Some(pool);
    }

    let boundary = Arc::clone(&*BOUNDARY) as Arc<dyn super::Boundary>;
    match RelayPool::start(config.clone().unwrap_or_default(), boundary) {
        Ok(pool) => {
            // Startup is serialized by the config lock, so this cannot race.
            let _ = POOL.set(pool);
            POOL.get()
        }
        Err(e) => {
            error!(error = %e, "Failed to start relay pool");
            None
        }
    }
}

/// Runs `f`, returning `fallback` if it panics.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!(function = name, "Panic caught at C boundary");
        fallback
    })
}

/// Reads a C string. Null reads as empty; invalid UTF-8 is replaced.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
unsafe fn read_str<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

/// Parses `json` into the pending slot unless the pool is already running.
fn configure(pending: &mut Option<BridgeConfig>, started: bool, json: &str) -> Result<()> {
    if started {
        return Err(Error::config("bridge already started"));
    }
    *pending = Some(BridgeConfig::from_json(json)?);
    Ok(())
}

fn handle(raw: c_int) -> Option<ConnectionId> {
    let id = ConnectionId::from_raw(raw);
    if id.is_none() {
        warn!(raw, "Invalid relay handle");
    }
    id
}

// ============================================================================
// Callback Registration
// ============================================================================

/// Registers the `opened(int id)` callback. Null unregisters.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterOpenedDelegate(callback: Option<NativeOpenedDelegate>) {
    BOUNDARY.register_opened(callback);
}

/// Registers the `closed(int id)` callback. Null unregisters.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterClosedDelegate(callback: Option<NativeClosedDelegate>) {
    BOUNDARY.register_closed(callback);
}

/// Registers the `message(int id, const char *text)` callback. Null unregisters.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterMessageDelegate(callback: Option<NativeTextDelegate>) {
    BOUNDARY.register_message(callback);
}

/// Registers the `log(int id, const char *text)` callback. Null unregisters.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterLogDelegate(callback: Option<NativeTextDelegate>) {
    BOUNDARY.register_log(callback);
}

/// Registers the `error(int id, const char *text)` callback. Null unregisters.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterErrorDelegate(callback: Option<NativeTextDelegate>) {
    BOUNDARY.register_error(callback);
}

// ============================================================================
// Configuration
// ============================================================================

/// Sets the bridge configuration from a JSON document.
///
/// Returns 0 on success, -1 if the JSON is invalid or the pool has already
/// started.
///
/// # Safety
///
/// `json` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn RealtimeBridge_Configure(json: *const c_char) -> c_int {
    // SAFETY: forwarded caller contract.
    let json = unsafe { read_str(json) };

    guarded("RealtimeBridge_Configure", FAILURE, || {
        let mut pending = PENDING_CONFIG.lock();
        match configure(&mut pending, POOL.get().is_some(), &json) {
            Ok(()) => 0,
            Err(e) => {
                warn!(error = %e, "Configuration rejected");
                FAILURE
            }
        }
    })
}

// ============================================================================
// Relay Operations
// ============================================================================

/// Creates a relay and returns its handle, or -1 if the bridge failed to start.
#[unsafe(no_mangle)]
pub extern "C" fn RealtimeBridge_Create() -> c_int {
    guarded("RealtimeBridge_Create", FAILURE, || {
        let Some(pool) = pool() else {
            return FAILURE;
        };
        match pool.create() {
            Ok(id) => id.as_raw(),
            Err(e) => {
                error!(error = %e, "Failed to create relay");
                FAILURE
            }
        }
    })
}

/// Starts connecting relay `id` to `uri`. Failures arrive as `error` callbacks.
///
/// # Safety
///
/// `uri` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn RealtimeBridge_Open(id: c_int, uri: *const c_char) {
    // SAFETY: forwarded caller contract.
    let uri = unsafe { read_str(uri) };

    guarded("RealtimeBridge_Open", (), || {
        if let (Some(pool), Some(id)) = (pool(), handle(id)) {
            pool.open(id, &uri);
        }
    });
}

/// Schedules a close of relay `id`'s socket. No-op if it has none.
#[unsafe(no_mangle)]
pub extern "C" fn RealtimeBridge_Close(id: c_int) {
    guarded("RealtimeBridge_Close", (), || {
        if let (Some(pool), Some(id)) = (pool(), handle(id)) {
            pool.close(id);
        }
    });
}

/// Schedules sending `text` on relay `id`. Dropped if it has no socket.
///
/// # Safety
///
/// `text` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn RealtimeBridge_Send(id: c_int, text: *const c_char) {
    // SAFETY: forwarded caller contract.
    let text = unsafe { read_str(text) };

    guarded("RealtimeBridge_Send", (), || {
        if let (Some(pool), Some(id)) = (pool(), handle(id)) {
            pool.send(id, &text);
        }
    });
}

/// Returns relay `id`'s handle, or -1 if it is unknown.
#[unsafe(no_mangle)]
pub extern "C" fn RealtimeBridge_GetId(id: c_int) -> c_int {
    guarded("RealtimeBridge_GetId", FAILURE, || {
        match (pool(), handle(id)) {
            (Some(pool), Some(id)) => pool.get_id(id).map_or(FAILURE, ConnectionId::as_raw),
            _ => FAILURE,
        }
    })
}

/// Forgets relay `id` and closes its socket.
#[unsafe(no_mangle)]
pub extern "C" fn RealtimeBridge_Release(id: c_int) {
    guarded("RealtimeBridge_Release", (), || {
        if let (Some(pool), Some(id)) = (pool(), handle(id)) {
            pool.release(id);
        }
    });
}

/// Delivers queued callbacks on the calling thread (manual dispatch only).
///
/// Returns the number of callbacks run.
#[unsafe(no_mangle)]
pub extern "C" fn RealtimeBridge_Pump() -> c_int {
    guarded("RealtimeBridge_Pump", 0, || {
        POOL.get()
            .map_or(0, |pool| c_int::try_from(pool.pump()).unwrap_or(c_int::MAX))
    })
}

// ============================================================================
// Tests
// ============================================================================
