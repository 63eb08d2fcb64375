//! The callback surface toward the native host.
//!
//! [`Boundary`] is the five-call contract the other runtime depends on.
//! [`NativeBoundary`] implements it with C function pointers registered by
//! the host through the `RealtimeBridge_Register*Delegate` entry points.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::{CString, c_char, c_int};

use parking_lot::RwLock;
use tracing::trace;

use crate::identifiers::ConnectionId;

// ============================================================================
// Boundary
// ============================================================================

/// Receiver of relay notifications.
///
/// All calls arrive on the dispatcher, one at a time, in post order.
pub trait Boundary: Send + Sync + 'static {
    /// Connection `id` is open. The return value is an opaque acknowledgment.
    fn opened(&self, id: ConnectionId) -> i32;

    /// Connection `id` has closed.
    fn closed(&self, id: ConnectionId);

    /// One received text message, or a transport exception description.
    fn message(&self, id: ConnectionId, text: &str);

    /// One diagnostic line.
    fn log(&self, id: ConnectionId, text: &str);

    /// One error description.
    fn error(&self, id: ConnectionId, text: &str);
}

// ============================================================================
// Native Callback Types
// ============================================================================

/// `void (*)(int id)`
pub type NativeOpenedDelegate = unsafe extern "C" fn(id: c_int);

/// `void (*)(int id)`
pub type NativeClosedDelegate = unsafe extern "C" fn(id: c_int);

/// `void (*)(int id, const char *text)`
///
/// `text` is NUL-terminated UTF-8 and only valid for the duration of the call.
pub type NativeTextDelegate = unsafe extern "C" fn(id: c_int, text: *const c_char);

// ============================================================================
// NativeBoundary
// ============================================================================

/// [`Boundary`] backed by host-registered C function pointers.
///
/// A callback that has not been registered is skipped.
#[derive(Default)]
pub struct NativeBoundary {
    opened: RwLock<Option<NativeOpenedDelegate>>,
    closed: RwLock<Option<NativeClosedDelegate>>,
    message: RwLock<Option<NativeTextDelegate>>,
    log: RwLock<Option<NativeTextDelegate>>,
    error: RwLock<Option<NativeTextDelegate>>,
}

impl std::fmt::Debug for NativeBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBoundary")
            .field("opened", &self.opened.read().is_some())
            .field("closed", &self.closed.read().is_some())
            .field("message", &self.message.read().is_some())
            .field("log", &self.log.read().is_some())
            .field("error", &self.error.read().is_some())
            .finish()
    }
}

impl NativeBoundary {
    /// Creates a boundary with no callbacks registered.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `opened` callback. `None` unregisters.
    pub fn register_opened(&self, callback: Option<NativeOpenedDelegate>) {
        *self.opened.write() = callback;
    }

    /// Registers the `closed` callback. `None` unregisters.
    pub fn register_closed(&self, callback: Option<NativeClosedDelegate>) {
        *self.closed.write() = callback;
    }

    /// Registers the `message` callback. `None` unregisters.
    pub fn register_message(&self, callback: Option<NativeTextDelegate>) {
        *self.message.write() = callback;
    }

    /// Registers the `log` callback. `None` unregisters.
    pub fn register_log(&self, callback: Option<NativeTextDelegate>) {
        *self.log.write() = callback;
    }

    /// Registers the `error` callback. `None` unregisters.
    pub fn register_error(&self, callback: Option<NativeTextDelegate>) {
        *self.error.write() = callback;
    }

    fn call_text(slot: &RwLock<Option<NativeTextDelegate>>, id: ConnectionId, text: &str) {
        // Copy the pointer out so the host may re-register from inside the call.
        let Some(callback) = *slot.read() else {
            trace!(%id, "Text callback not registered");
            return;
        };
        let text = to_c_string(text);
        // SAFETY: the host registered `callback` with the declared signature;
        // `text` outlives the call.
        unsafe { callback(id.as_raw(), text.as_ptr()) }
    }
}

impl Boundary for NativeBoundary {
    fn opened(&self, id: ConnectionId) -> i32 {
        let Some(callback) = *self.opened.read() else {
            trace!(%id, "Opened callback not registered");
            return 0;
        };
        // SAFETY: registered by the host with the declared signature.
        unsafe { callback(id.as_raw()) }
        0
    }

    fn closed(&self, id: ConnectionId) {
        let Some(callback) = *self.closed.read() else {
            trace!(%id, "Closed callback not registered");
            return;
        };
        // SAFETY: registered by the host with the declared signature.
        unsafe { callback(id.as_raw()) }
    }

    fn message(&self, id: ConnectionId, text: &str) {
        Self::call_text(&self.message, id, text);
    }

    fn log(&self, id: ConnectionId, text: &str) {
        Self::call_text(&self.log, id, text);
    }

    fn error(&self, id: ConnectionId, text: &str) {
        Self::call_text(&self.error, id, text);
    }
}

/// Converts to a C string, dropping interior NUL bytes.
fn to_c_string(text: &str) -> CString {
    CString::new(text).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::CStr;

    use parking_lot::Mutex;

    static SEEN: Mutex<Vec<(i32, String)>> = Mutex::new(Vec::new());

    unsafe extern "C" fn record_opened(id: c_int) {
        SEEN.lock().push((id, "opened".to_string()));
    }

    unsafe extern "C" fn record_text(id: c_int, text: *const c_char) {
        // SAFETY: the boundary passes a valid NUL-terminated string.
        let text = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
        SEEN.lock().push((id, text));
    }

    #[test]
    fn test_registered_callbacks_receive_calls() {
        let boundary = NativeBoundary::new();
        boundary.register_opened(Some(record_opened));
        boundary.register_error(Some(record_text));

        let id = ConnectionId::from_raw(9001).unwrap();
        assert_eq!(boundary.opened(id), 0);
        boundary.error(id, "Error: bad\0uri");
        // Not registered.
        boundary.message(id, "dropped");
        boundary.closed(id);

        let seen: Vec<_> = SEEN
            .lock()
            .iter()
            .filter(|(raw, _)| *raw == 9001)
            .cloned()
            .collect();
        assert_eq!(
            seen,
            vec![
                (9001, "opened".to_string()),
                (9001, "Error: baduri".to_string()),
            ]
        );
    }

    #[test]
    fn test_unregister_with_none() {
        let boundary = NativeBoundary::new();
        boundary.register_log(Some(record_text));
        boundary.register_log(None);

        boundary.log(ConnectionId::from_raw(9002).unwrap(), "ignored");
        assert!(SEEN.lock().iter().all(|(raw, _)| *raw != 9002));
    }

    #[test]
    fn test_to_c_string_strips_nul() {
        assert_eq!(to_c_string("a\0b\0").as_bytes(), b"ab");
        assert_eq!(to_c_string("plain").as_bytes(), b"plain");
    }
}
