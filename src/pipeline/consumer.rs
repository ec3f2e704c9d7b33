//! Fragment, simulate loss, reassemble.

use std::{thread, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{PipelineCounters, report::Reporter};
use crate::{
    clock::{Clock, Pacer},
    config::PipelineConfig,
    flow::FlowTableStats,
    fragment::{Datagram, Fragmenter, Reassembler, Reassembly},
    pool::PacketPool,
    queue::QueueRx,
};

/// Pause between graceful drain passes.
pub const DRAIN_POLL: Duration = Duration::from_millis(10);

/// What the consumer leaves behind when it stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerOutcome {
    /// The run was cut short by cancellation rather than reaching its count.
    pub interrupted: bool,
    pub table: FlowTableStats,
    /// Flows still live when the consumer stopped.
    pub live_flows: usize,
}

/// Drains the queue through the fragmenter and reassembler.
pub struct Consumer<C> {
    rx: QueueRx<Datagram>,
    fragmenter: Fragmenter,
    reassembler: Reassembler,
    pacer: Pacer,
    reporter: Reporter,
    clock: C,
    counters: PipelineCounters,
    target: u64,
    error_mode: bool,
    dump: bool,
    gc: bool,
    drain_batch: usize,
    token: CancellationToken,
    producer: CancellationToken,
}

impl<C: Clock> Consumer<C> {
    /// `token` aborts the consumer; `producer` is cancelled once the target
    /// count is reached.
    #[must_use]
    pub fn new(
        config: &PipelineConfig,
        rx: QueueRx<Datagram>,
        pool: PacketPool,
        clock: C,
        counters: PipelineCounters,
        token: CancellationToken,
        producer: CancellationToken,
    ) -> Self {
        let start = clock.now();
        Self {
            rx,
            fragmenter: Fragmenter::new(config.mtu, config.max_fragments),
            reassembler: Reassembler::new(config.flow_table(), pool),
            pacer: Pacer::new(config.tx_interval()),
            reporter: Reporter::new(config.display_interval(), start, config.mtu.get(), config.stat),
            clock,
            counters,
            target: config.packet_count.get(),
            error_mode: config.error_mode,
            dump: config.dump,
            gc: config.gc,
            drain_batch: config.drain_batch.get(),
            token,
            producer,
        }
    }

    #[must_use]
    pub fn reassembler(&self) -> &Reassembler { &self.reassembler }

    /// Busy-poll until the target count is processed or the token fires,
    /// then stop the producer and, unless interrupted, drain.
    pub fn run(mut self) -> ConsumerOutcome {
        let mut interrupted = false;
        while self.counters.processed() < self.target {
            if self.token.is_cancelled() {
                interrupted = true;
                break;
            }
            if !self.poll_once() {
                std::hint::spin_loop();
            }
        }
        self.producer.cancel();
        info!(
            processed = self.counters.processed(),
            interrupted, "consumer finished processing"
        );
        if !interrupted {
            interrupted = !self.drain();
        }
        self.outcome(interrupted)
    }

    /// One loop iteration: dequeue when paced, report, sweep and release a
    /// slice of the death row. Returns whether a datagram was processed.
    pub fn poll_once(&mut self) -> bool {
        let now = self.clock.now();
        let mut worked = false;
        if self.pacer.is_due(now)
            && let Some(datagram) = self.rx.try_dequeue()
        {
            self.pacer.mark(now);
            self.process(datagram);
            worked = true;
        }
        self.reporter.maybe_report(
            now,
            self.counters.snapshot(),
            self.reassembler.pool(),
            self.reassembler.table(),
        );
        if self.gc {
            self.reassembler.collect_garbage(now);
        }
        self.reassembler.drain_death_row(self.drain_batch);
        worked
    }

    /// Run one datagram through fragmentation and reassembly. Failures are
    /// logged and counted; the datagram always counts as processed.
    pub fn process(&mut self, datagram: Datagram) {
        self.counters.inc_processed();
        let now = self.clock.now();
        let batch = match self.fragmenter.fragment(datagram) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%error, "fragmentation failed");
                self.counters.inc_fragmentation_failures();
                return;
            }
        };
        let key = batch.key();
        let mut fragments = batch.into_fragments();
        if self.error_mode {
            // Simulated loss of the terminal fragment.
            fragments.pop();
        }

        let last = fragments.len().saturating_sub(1);
        let mut completed = false;
        for (index, fragment) in fragments.into_iter().enumerate() {
            match self.reassembler.accept(fragment, now) {
                Ok(Reassembly::Complete(rebuilt)) => {
                    completed = true;
                    self.counters.inc_reassembled();
                    if index < last {
                        error!(flow = %key, index, "datagram completed before its final fragment");
                    }
                    debug!(flow = %key, len = rebuilt.len(), "datagram reassembled");
                }
                Ok(Reassembly::Incomplete) => {}
                Err(error) => {
                    warn!(%error, "reassembly failed");
                    self.counters.inc_reassembly_failures();
                }
            }
        }
        if !completed {
            debug!(flow = %key, "datagram incomplete");
        }

        if self.dump {
            super::report::dump_flows(self.reassembler.table());
        }
    }

    /// Discard queued datagrams and sweep until every pool buffer is back.
    /// Returns `false` if cancelled first.
    fn drain(&mut self) -> bool {
        let pool = self.reassembler.pool().clone();
        loop {
            let mut discarded = 0_usize;
            while self.rx.try_dequeue().is_some() {
                discarded += 1;
            }
            let now = self.clock.now();
            self.reassembler.collect_garbage(now);
            self.reassembler.drain_death_row(usize::MAX);
            if pool.in_use() == 0 {
                debug!("pool drained");
                return true;
            }
            if self.token.is_cancelled() {
                warn!(in_use = pool.in_use(), "drain interrupted");
                return false;
            }
            debug!(
                discarded,
                live = self.reassembler.table().len(),
                in_use = pool.in_use(),
                "waiting for flows to expire"
            );
            thread::sleep(DRAIN_POLL);
        }
    }

    fn outcome(&self, interrupted: bool) -> ConsumerOutcome {
        ConsumerOutcome {
            interrupted,
            table: *self.reassembler.table().stats(),
            live_flows: self.reassembler.table().len(),
        }
    }
}
