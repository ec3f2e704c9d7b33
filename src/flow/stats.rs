//! Lifecycle counters for the flow table.

use std::fmt;

use super::FlowState;

/// Running counters kept by a [`FlowTable`](super::FlowTable).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowTableStats {
    pub lookups: u64,
    pub hits: u64,
    pub created: u64,
    pub completed: u64,
    pub evicted: u64,
    pub expired: u64,
    pub discarded: u64,
    /// Creations that recycled an expired record in place.
    pub stale_reused: u64,
    /// Admissions that found their bucket full with the table under its
    /// flow limit.
    pub bucket_overflows: u64,
}

impl FlowTableStats {
    pub(crate) fn record_fate(&mut self, fate: FlowState) {
        match fate {
            FlowState::Complete => self.completed += 1,
            FlowState::Expired => self.expired += 1,
            FlowState::Evicted => self.evicted += 1,
            FlowState::Discarded => self.discarded += 1,
            FlowState::Empty | FlowState::Collecting => {}
        }
    }

    /// Flows that left the table for any reason.
    #[must_use]
    pub fn retired(&self) -> u64 { self.completed + self.expired + self.evicted + self.discarded }
}

impl fmt::Display for FlowTableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "flow table statistics:")?;
        writeln!(f, "  lookups:          {}", self.lookups)?;
        writeln!(f, "  hits:             {}", self.hits)?;
        writeln!(f, "  created:          {}", self.created)?;
        writeln!(f, "  completed:        {}", self.completed)?;
        writeln!(f, "  expired:          {}", self.expired)?;
        writeln!(f, "  evicted:          {}", self.evicted)?;
        writeln!(f, "  discarded:        {}", self.discarded)?;
        writeln!(f, "  stale reused:     {}", self.stale_reused)?;
        write!(f, "  bucket overflows: {}", self.bucket_overflows)
    }
}
