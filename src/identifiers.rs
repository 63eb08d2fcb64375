//! Type-safe identifiers.
//!
//! [`ConnectionId`] is the handle the native side uses to demultiplex events
//! from concurrently open connections. [`SocketSerial`] tags each underlying
//! socket so a stale close can be told apart from the current one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crate::error::{Error, Result};

// ============================================================================
// Counters
// ============================================================================

/// Process-wide handle counter. Handles start at 0, matching the values the
/// managed layer already expects.
static NEXT_CONNECTION_ID: AtomicI32 = AtomicI32::new(0);

static NEXT_SOCKET_SERIAL: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ConnectionId
// ============================================================================

/// Handle of one relay instance.
///
/// Assigned once at creation, strictly increasing across the process,
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(i32);

impl ConnectionId {
    /// Allocates the next handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlesExhausted`] once `i32::MAX` has been handed
    /// out. The counter never wraps into negative values.
    #[inline]
    pub fn next() -> Result<Self> {
        allocate(&NEXT_CONNECTION_ID)
            .map(Self)
            .ok_or(Error::HandlesExhausted)
    }

    /// Wraps a raw handle received across the C boundary.
    ///
    /// Returns `None` for negative values, which are never allocated.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 { None } else { Some(Self(raw)) }
    }

    /// Returns the raw handle for the C boundary.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

/// Takes the counter's value and advances it, unless it is already spent.
fn allocate(counter: &AtomicI32) -> Option<i32> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            (n >= 0).then(|| n.checked_add(1).unwrap_or(i32::MIN))
        })
        .ok()
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SocketSerial
// ============================================================================

/// Unique tag for one underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketSerial(u64);

impl SocketSerial {
    /// Allocates the next serial.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SOCKET_SERIAL.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_next_is_increasing() {
        let a = ConnectionId::next().unwrap();
        let b = ConnectionId::next().unwrap();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_allocate_stops_at_max() {
        let counter = AtomicI32::new(i32::MAX - 1);

        assert_eq!(allocate(&counter), Some(i32::MAX - 1));
        assert_eq!(allocate(&counter), Some(i32::MAX));
        assert_eq!(allocate(&counter), None);
        assert_eq!(allocate(&counter), None);
    }

    #[test]
    fn test_from_raw_rejects_negative() {
        assert!(ConnectionId::from_raw(-1).is_none());
        assert_eq!(ConnectionId::from_raw(7).map(ConnectionId::as_raw), Some(7));
    }

    #[test]
    fn test_display() {
        let id = ConnectionId::from_raw(42).unwrap();
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_socket_serial_unique() {
        assert_ne!(SocketSerial::next(), SocketSerial::next());
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..200).map(|_| ConnectionId::next().unwrap()).collect::<Vec<_>>()))
            .collect();

        let mut all: Vec<ConnectionId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    proptest! {
        #[test]
        fn prop_sequential_ids_strictly_increase(count in 1usize..64) {
            let ids: Vec<_> = (0..count).map(|_| ConnectionId::next().unwrap()).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
