//! Counters shared between the producer, the consumer and the driver.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct Inner {
    produced: AtomicU64,
    processed: AtomicU64,
    reassembled: AtomicU64,
    enqueue_failures: AtomicU64,
    alloc_failures: AtomicU64,
    fragmentation_failures: AtomicU64,
    reassembly_failures: AtomicU64,
}

/// Cheaply cloneable handle to the pipeline's atomic counters.
///
/// Each counter has a single writer, so relaxed ordering suffices.
#[derive(Clone, Debug, Default)]
pub struct PipelineCounters {
    inner: Arc<Inner>,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Datagrams accepted by the queue.
    pub produced: u64,
    /// Datagrams taken off the queue and run through the packet path.
    pub processed: u64,
    pub reassembled: u64,
    /// Datagrams dropped because the queue was full.
    pub enqueue_failures: u64,
    /// Producer ticks skipped because the pool was empty.
    pub alloc_failures: u64,
    pub fragmentation_failures: u64,
    pub reassembly_failures: u64,
}

impl PipelineCounters {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn inc_produced(&self) { self.inner.produced.fetch_add(1, Ordering::Relaxed); }

    pub fn inc_processed(&self) { self.inner.processed.fetch_add(1, Ordering::Relaxed); }

    pub fn inc_reassembled(&self) { self.inner.reassembled.fetch_add(1, Ordering::Relaxed); }

    pub fn inc_enqueue_failures(&self) {
        self.inner.enqueue_failures.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_enqueue_failures();
    }

    pub fn inc_alloc_failures(&self) { self.inner.alloc_failures.fetch_add(1, Ordering::Relaxed); }

    pub fn inc_fragmentation_failures(&self) {
        self.inner
            .fragmentation_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reassembly_failures(&self) {
        self.inner.reassembly_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn processed(&self) -> u64 { self.inner.processed.load(Ordering::Relaxed) }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CounterSnapshot {
            produced: load(&self.inner.produced),
            processed: load(&self.inner.processed),
            reassembled: load(&self.inner.reassembled),
            enqueue_failures: load(&self.inner.enqueue_failures),
            alloc_failures: load(&self.inner.alloc_failures),
            fragmentation_failures: load(&self.inner.fragmentation_failures),
            reassembly_failures: load(&self.inner.reassembly_failures),
        }
    }
}
