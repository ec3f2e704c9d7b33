//! Inbound helper that stitches fragments back into whole datagrams.
//!
//! [`Reassembler`] mirrors the outbound [`Fragmenter`](crate::fragment::Fragmenter).
//! Fragments are grouped by [`FlowKey`](crate::fragment::FlowKey) in a
//! [`FlowTable`]; once every byte of a datagram is covered it is rebuilt in
//! a fresh pool buffer. Buffers of retired flows are parked on a
//! [`DeathRow`] and released in bounded batches by the caller.

use std::time::Instant;

use tracing::{debug, trace};

use super::{Datagram, Fragment, ReassemblyError};
use crate::{
    flow::{DeathRow, FlowRecord, FlowState, FlowTable, FlowTableConfig, Insertion, RejectKind},
    metrics,
    pool::{PacketPool, PoolError},
};

/// Result of feeding one fragment to the reassembler.
#[derive(Debug)]
pub enum Reassembly {
    /// The fragment completed its datagram.
    Complete(Datagram),
    /// More fragments are needed.
    Incomplete,
}

impl Reassembly {
    #[must_use]
    pub fn is_complete(&self) -> bool { matches!(self, Self::Complete(_)) }

    #[must_use]
    pub fn into_datagram(self) -> Option<Datagram> {
        match self {
            Self::Complete(datagram) => Some(datagram),
            Self::Incomplete => None,
        }
    }
}

/// Stateful fragment reassembler with TTL-based expiry.
#[derive(Debug)]
pub struct Reassembler {
    table: FlowTable,
    death_row: DeathRow,
    pool: PacketPool,
}

impl Reassembler {
    /// Create a reassembler that builds output datagrams from `pool`.
    #[must_use]
    pub fn new(config: FlowTableConfig, pool: PacketPool) -> Self {
        Self {
            table: FlowTable::new(config),
            death_row: DeathRow::new(config.death_row_capacity),
            pool,
        }
    }

    /// Process a fragment using an explicit clock reading.
    ///
    /// Returns [`Reassembly::Complete`] when the fragment fills the last gap
    /// of its datagram and [`Reassembly::Incomplete`] otherwise. A fragment
    /// identical in offset and length to one already stored is dropped and
    /// reported as `Incomplete`.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::DuplicateFragment`] if the fragment
    /// overlaps stored data; the flow survives. Returns
    /// [`ReassemblyError::Inconsistent`] or
    /// [`ReassemblyError::TooManyFragments`] if the fragment contradicts the
    /// flow, and [`ReassemblyError::Pool`] if the rebuilt datagram cannot be
    /// allocated; in these cases the flow is discarded.
    pub fn accept(
        &mut self,
        fragment: Fragment,
        now: Instant,
    ) -> Result<Reassembly, ReassemblyError> {
        metrics::inc_fragments();
        let key = fragment.key();
        let limit = self.table.config().max_fragments.get();
        let (handle, record) = self.table.lookup_or_create(key, now, &mut self.death_row);

        match record.insert(fragment, limit) {
            Ok(Insertion::Duplicate(payload)) => {
                trace!(flow = %key, "duplicate fragment dropped");
                self.death_row.defer(payload);
                Ok(Reassembly::Incomplete)
            }
            Ok(Insertion::Stored) => {
                self.table.touch(handle, now);
                Ok(Reassembly::Incomplete)
            }
            Ok(Insertion::Complete) => {
                let rebuilt = self
                    .table
                    .get(handle)
                    .map_or(Err(RebuildError::Missing), |record| self.rebuild(record));
                let fate = if rebuilt.is_ok() {
                    FlowState::Complete
                } else {
                    FlowState::Discarded
                };
                if let Some(record) = self.table.detach(handle, fate) {
                    self.death_row.bury(record);
                }
                match rebuilt {
                    Ok(datagram) => {
                        metrics::inc_reassembled();
                        Ok(Reassembly::Complete(datagram))
                    }
                    Err(RebuildError::Pool(source)) => Err(ReassemblyError::Pool { key, source }),
                    Err(RebuildError::Missing) => Err(ReassemblyError::Inconsistent {
                        key,
                        reason: "completed flow holds no header",
                    }),
                }
            }
            Err(rejection) => {
                self.death_row.defer(rejection.payload);
                let error = match rejection.kind {
                    RejectKind::Overlap { start, end } => {
                        return Err(ReassemblyError::DuplicateFragment { key, start, end });
                    }
                    RejectKind::Inconsistent(reason) => {
                        ReassemblyError::Inconsistent { key, reason }
                    }
                    RejectKind::TooManyFragments => {
                        ReassemblyError::TooManyFragments { key, limit }
                    }
                };
                if let Some(record) = self.table.detach(handle, FlowState::Discarded) {
                    self.death_row.bury(record);
                }
                Err(error)
            }
        }
    }

    /// Process a fragment using the current time.
    ///
    /// # Errors
    ///
    /// See [`Reassembler::accept`].
    pub fn accept_now(&mut self, fragment: Fragment) -> Result<Reassembly, ReassemblyError> {
        self.accept(fragment, Instant::now())
    }

    /// Retire flows idle past the TTL. Returns the number retired.
    pub fn collect_garbage(&mut self, now: Instant) -> usize {
        let retired = self.table.check_expired(now, &mut self.death_row);
        if retired > 0 {
            debug!(retired, pending = self.death_row.len(), "expired flows swept");
        }
        retired
    }

    /// Release up to `window` parked buffers.
    pub fn drain_death_row(&mut self, window: usize) -> usize { self.death_row.drain(window) }

    #[must_use]
    pub fn table(&self) -> &FlowTable { &self.table }

    #[must_use]
    pub fn death_row(&self) -> &DeathRow { &self.death_row }

    #[must_use]
    pub fn pool(&self) -> &PacketPool { &self.pool }

    fn rebuild(&self, record: &FlowRecord) -> Result<Datagram, RebuildError> {
        let template = record
            .template()
            .ok_or(RebuildError::Missing)?
            .with_fragment(0, false);
        let parts = record.fragments().iter().map(|entry| entry.payload().as_ref());
        Ok(Datagram::assemble(&self.pool, &template, parts)?)
    }
}

#[derive(Debug)]
enum RebuildError {
    Missing,
    Pool(PoolError),
}

impl From<PoolError> for RebuildError {
    fn from(error: PoolError) -> Self { Self::Pool(error) }
}
