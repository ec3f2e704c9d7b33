//! Periodic throughput reports and flow table dumps.

use std::{fmt::Write as _, time::Instant};

use tracing::info;

use super::CounterSnapshot;
use crate::{clock::Pacer, flow::FlowTable, pool::PacketPool};

/// Payload bytes shown per fragment in a flow dump.
const DUMP_HEAD: usize = 8;

/// Estimated throughput in megabits per second for `packets` datagrams of
/// `packet_bytes` bytes seen over `seconds`.
#[must_use]
pub fn estimate_mbps(packets: u64, packet_bytes: usize, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    #[expect(clippy::cast_precision_loss, reason = "rates are approximate")]
    let bits = packets as f64 * packet_bytes as f64 * 8.0;
    bits / 1_000_000.0 / seconds
}

/// Logs counters every display interval.
#[derive(Debug)]
pub struct Reporter {
    pacer: Pacer,
    previous: CounterSnapshot,
    packet_bytes: usize,
    include_stats: bool,
}

impl Reporter {
    /// Start reporting one interval after `start`.
    #[must_use]
    pub fn new(
        interval: std::time::Duration,
        start: Instant,
        packet_bytes: usize,
        include_stats: bool,
    ) -> Self {
        let mut pacer = Pacer::new(interval);
        pacer.mark(start);
        Self {
            pacer,
            previous: CounterSnapshot::default(),
            packet_bytes,
            include_stats,
        }
    }

    /// Log a report if the interval has elapsed. Returns whether it did.
    pub fn maybe_report(
        &mut self,
        now: Instant,
        current: CounterSnapshot,
        pool: &PacketPool,
        table: &FlowTable,
    ) -> bool {
        if !self.pacer.tick(now) {
            return false;
        }
        let rx_delta = current.processed - self.previous.processed;
        let reassembled_delta = current.reassembled - self.previous.reassembled;
        let mbps = estimate_mbps(
            rx_delta,
            self.packet_bytes,
            self.pacer.interval().as_secs_f64(),
        );
        info!(
            rx = current.processed,
            reassembled = current.reassembled,
            rx_delta,
            reassembled_delta,
            mbps = format_args!("{mbps:.2}"),
            enq_fail = current.enqueue_failures,
            frag_fail = current.fragmentation_failures,
            reasm_fail = current.reassembly_failures,
            "throughput"
        );
        info!(
            capacity = pool.capacity(),
            available = pool.available(),
            in_use = pool.in_use(),
            alloc_failures = pool.alloc_failures(),
            "packet pool"
        );
        crate::metrics::set_pool_in_use(pool.in_use());
        if self.include_stats {
            info!(live = table.len(), "{}", table.stats());
        }
        self.previous = current;
        true
    }
}

/// Render the LRU list, oldest first, with the head of every payload.
#[must_use]
pub fn render_flows(table: &FlowTable) -> String {
    let mut out = String::new();
    for (position, record) in table.lru().enumerate() {
        let _ = writeln!(
            out,
            "#{position} {} state={:?} covered={} total={:?}",
            record.key(),
            record.state(),
            record.covered(),
            record.total_len(),
        );
        for entry in record.fragments() {
            let head = &entry.payload()[..entry.len().min(DUMP_HEAD)];
            let _ = writeln!(
                out,
                "    [{}, {}) mf={} head={head:02x?}",
                entry.start(),
                entry.end(),
                entry.more_fragments(),
            );
        }
    }
    out
}

/// Log [`render_flows`] at info level.
pub fn dump_flows(table: &FlowTable) {
    info!(live = table.len(), "flow table dump:\n{}", render_flows(table));
}
