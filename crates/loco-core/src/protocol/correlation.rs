//! Correlation-id allocation for request/response pairing.
//!
//! Every request packet carries a fresh id; the matching response echoes it
//! back so the session can route it to the right pending caller regardless
//! of arrival order. Id 0 is reserved: server pushes use ids the client
//! never allocated, and 0 is the conventional "no correlation" value.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing allocator for packet ids.
///
/// Ids start at 1 and skip 0 when the counter wraps. `Relaxed` ordering is
/// sufficient: the ids only need to be unique, they carry no memory
/// synchronization role.
#[derive(Debug)]
pub struct PacketIdCounter {
    inner: AtomicU32,
}

impl PacketIdCounter {
    /// Creates a counter whose first allocation is 1.
    pub fn new() -> PacketIdCounter {
        PacketIdCounter {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns a fresh non-zero correlation id.
    pub fn next(&self) -> u32 {
        loop {
            let id = self.inner.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for PacketIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
