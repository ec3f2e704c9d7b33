//! Deferred release of payload buffers.
//!
//! Retired flows hand their fragment payloads here instead of freeing them
//! inline. The consumer drains a bounded batch per iteration so a burst of
//! expirations cannot stall the packet path.

use std::{collections::VecDeque, num::NonZeroUsize};

use bytes::Bytes;
use tracing::debug;

use super::FlowRecord;

/// Queue of buffers awaiting release.
#[derive(Debug)]
pub struct DeathRow {
    pending: VecDeque<Bytes>,
    released: u64,
}

impl DeathRow {
    /// Create a death row with room for `capacity` buffers preallocated.
    ///
    /// The queue grows past it when a sweep retires more; only
    /// [`DeathRow::drain`] bounds the work done per call.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity.get()),
            released: 0,
        }
    }

    /// Queue one buffer for release.
    pub fn defer(&mut self, buffer: Bytes) { self.pending.push_back(buffer); }

    /// Queue every payload a retired record still holds.
    pub fn bury(&mut self, record: FlowRecord) {
        debug!(
            flow = %record.key(),
            fate = ?record.state(),
            fragments = record.fragment_count(),
            covered = record.covered(),
            "flow retired"
        );
        self.pending.extend(record.into_payloads());
    }

    /// Release up to `window` buffers, oldest first. Returns the number
    /// released.
    pub fn drain(&mut self, window: usize) -> usize {
        let count = window.min(self.pending.len());
        self.pending.drain(..count);
        self.released += count as u64;
        count
    }

    /// Release everything still pending.
    pub fn drain_all(&mut self) -> usize { self.drain(self.pending.len()) }

    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Total buffers released since creation.
    #[must_use]
    pub fn released(&self) -> u64 { self.released }
}
