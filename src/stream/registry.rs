//! Stream id allocation and tombstone tracking.
//!
//! The initiating side of a connection allocates odd ids, the accepting
//! side even ids; within a side ids increase monotonically and are never
//! reused. Terminated ids are kept in a tombstone set long enough to
//! swallow late CANCEL and REQUEST_N frames from the peer without
//! mistaking them for new-stream indicators.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use tokio::time::Instant;

use crate::frame::StreamId;

/// Which end of the connection this endpoint is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The initiating side; allocates odd stream ids.
    Client,
    /// The accepting side; allocates even stream ids.
    Server,
}

impl Role {
    /// First stream id this side may allocate.
    #[must_use]
    pub const fn first_stream_id(self) -> u32 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }

    /// Whether `id` could have been allocated by this side.
    #[must_use]
    pub const fn owns(self, id: StreamId) -> bool {
        !id.is_connection() && id.value() % 2 == self.first_stream_id() % 2
    }
}

/// Monotonic allocator of locally initiated stream ids.
///
/// Shared between the requester facade (which picks ids) and the
/// connection actor (which validates them), hence the atomic.
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: AtomicU32,
}

impl StreamIdAllocator {
    /// Create an allocator for the given role.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self { next: AtomicU32::new(role.first_stream_id()) }
    }

    /// Allocate the next id, or `None` once the 31-bit space is spent.
    #[must_use]
    pub fn allocate(&self) -> Option<StreamId> {
        let id = self.next.fetch_add(2, Ordering::Relaxed);
        StreamId::new(id)
    }
}

/// Recently terminated stream ids, retained for a bounded horizon.
#[derive(Debug)]
pub struct Tombstones {
    horizon: Duration,
    buried: HashMap<StreamId, Instant>,
}

impl Tombstones {
    /// Create a tombstone set with the given retention horizon.
    #[must_use]
    pub fn new(horizon: Duration) -> Self { Self { horizon, buried: HashMap::new() } }

    /// Replace the retention horizon (the server adopts the client's
    /// keepalive settings after SETUP).
    pub const fn set_horizon(&mut self, horizon: Duration) { self.horizon = horizon; }

    /// Record a terminated stream id.
    pub fn bury(&mut self, id: StreamId) {
        let now = Instant::now();
        self.purge(now);
        self.buried.insert(id, now);
    }

    /// Whether `id` terminated within the horizon.
    pub fn contains(&mut self, id: StreamId) -> bool {
        self.purge(Instant::now());
        self.buried.contains_key(&id)
    }

    /// Drop entries older than the horizon.
    pub fn purge(&mut self, now: Instant) {
        let horizon = self.horizon;
        self.buried
            .retain(|_, buried_at| now.saturating_duration_since(*buried_at) < horizon);
    }

    /// Number of ids currently retained.
    #[must_use]
    pub fn len(&self) -> usize { self.buried.len() }

    /// Whether no ids are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buried.is_empty() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn client_ids_are_odd_and_monotonic() {
        let allocator = StreamIdAllocator::new(Role::Client);
        let first = allocator.allocate().expect("id available");
        let second = allocator.allocate().expect("id available");
        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 3);
    }

    #[rstest]
    fn server_ids_are_even() {
        let allocator = StreamIdAllocator::new(Role::Server);
        assert_eq!(allocator.allocate().expect("id available").value(), 2);
        assert_eq!(allocator.allocate().expect("id available").value(), 4);
    }

    #[rstest]
    fn parity_identifies_the_originator() {
        let client_id = StreamId::new(7).expect("valid id");
        let server_id = StreamId::new(8).expect("valid id");
        assert!(Role::Client.owns(client_id));
        assert!(!Role::Client.owns(server_id));
        assert!(Role::Server.owns(server_id));
        assert!(!Role::Server.owns(StreamId::CONNECTION));
    }

    #[tokio::test(start_paused = true)]
    async fn tombstones_expire_after_the_horizon() {
        let mut tombstones = Tombstones::new(Duration::from_secs(40));
        let id = StreamId::new(5).expect("valid id");
        tombstones.bury(id);
        assert!(tombstones.contains(id));

        tokio::time::advance(Duration::from_secs(41)).await;
        assert!(!tombstones.contains(id));
        assert!(tombstones.is_empty());
    }
}
