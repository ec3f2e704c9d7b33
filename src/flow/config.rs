//! Settings that bound flow table size and reassembly resource usage.

use std::{num::NonZeroUsize, time::Duration};

/// Geometry and limits of a [`FlowTable`](crate::flow::FlowTable).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowTableConfig {
    /// Maximum number of live flows across all buckets.
    pub max_flows: NonZeroUsize,
    /// Slots per bucket. Rounded up to a power of two.
    pub bucket_entries: NonZeroUsize,
    /// Maximum fragments a single flow may hold.
    pub max_fragments: NonZeroUsize,
    /// A flow untouched for longer than this is expired.
    pub ttl: Duration,
    /// Death row buffers preallocated up front.
    pub death_row_capacity: NonZeroUsize,
}

impl FlowTableConfig {
    /// Configuration with the default bucket width, fragment limit and death
    /// row size.
    #[must_use]
    pub fn new(max_flows: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            max_flows,
            bucket_entries: NonZeroUsize::new(crate::config::BUCKET_ENTRIES)
                .unwrap_or(NonZeroUsize::MIN),
            max_fragments: NonZeroUsize::new(crate::config::MAX_FRAGMENTS)
                .unwrap_or(NonZeroUsize::MIN),
            ttl,
            death_row_capacity: NonZeroUsize::new(
                crate::config::DRAIN_BATCH * crate::config::MAX_FRAGMENTS,
            )
            .unwrap_or(NonZeroUsize::MIN),
        }
    }

    #[must_use]
    pub fn with_bucket_entries(mut self, bucket_entries: NonZeroUsize) -> Self {
        self.bucket_entries = bucket_entries;
        self
    }

    #[must_use]
    pub fn with_max_fragments(mut self, max_fragments: NonZeroUsize) -> Self {
        self.max_fragments = max_fragments;
        self
    }

    #[must_use]
    pub fn with_death_row_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.death_row_capacity = capacity;
        self
    }

    /// Slots per bucket after rounding to a power of two.
    #[must_use]
    pub fn bucket_width(&self) -> usize { self.bucket_entries.get().next_power_of_two() }

    /// Number of buckets; always a power of two and at least one.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        (self.max_flows.get().next_power_of_two() / self.bucket_width()).max(1)
    }

    /// Upper bound on buffered payload bytes for fragments of at most
    /// `max_fragment_size` bytes.
    #[must_use]
    pub fn worst_case_bytes(&self, max_fragment_size: usize) -> usize {
        self.max_flows
            .get()
            .saturating_mul(self.max_fragments.get())
            .saturating_mul(max_fragment_size)
    }
}
