//! Synthetic datagram source.

use std::net::Ipv4Addr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::PipelineCounters;
use crate::{
    clock::{Clock, Pacer},
    fragment::{Datagram, IPV4_HEADER_LEN, Ipv4Header},
    pool::{PacketPool, PoolError},
    queue::{EnqueueError, QueueTx},
};

/// Source address of every synthetic datagram.
pub const SOURCE_ADDR: Ipv4Addr = Ipv4Addr::new(2, 3, 4, 5);
/// Destination address of every synthetic datagram.
pub const DEST_ADDR: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);
/// UDP.
pub const PROTOCOL: u8 = 17;

/// Deterministic payload for datagram `id`: byte `i` is `id + i` mod 256.
#[must_use]
pub fn synthetic_payload(id: u16, len: usize) -> Vec<u8> {
    let seed = id.to_be_bytes()[1];
    (0..len)
        .map(|i| seed.wrapping_add(i.to_le_bytes()[0]))
        .collect()
}

/// Builds paced datagrams and offers them to the queue.
pub struct Producer<C> {
    pool: PacketPool,
    tx: QueueTx<Datagram>,
    pacer: Pacer,
    clock: C,
    counters: PipelineCounters,
    payload_len: usize,
    next_id: u16,
    token: CancellationToken,
}

impl<C: Clock> Producer<C> {
    /// `packet_len` includes the header.
    #[must_use]
    pub fn new(
        pool: PacketPool,
        tx: QueueTx<Datagram>,
        pacer: Pacer,
        clock: C,
        counters: PipelineCounters,
        packet_len: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            pool,
            tx,
            pacer,
            clock,
            counters,
            payload_len: packet_len.saturating_sub(IPV4_HEADER_LEN),
            next_id: 0,
            token,
        }
    }

    /// Busy-poll until cancelled or the consumer goes away.
    pub fn run(mut self) {
        while !self.token.is_cancelled() {
            if !self.poll_once() {
                std::hint::spin_loop();
            }
            if self.tx.is_closed() {
                break;
            }
        }
        debug!(produced = self.counters.snapshot().produced, "producer stopped");
    }

    /// Emit one datagram if the pacer allows. Returns whether it ticked.
    pub fn poll_once(&mut self) -> bool {
        if !self.pacer.tick(self.clock.now()) {
            return false;
        }
        let datagram = match self.build() {
            Ok(datagram) => datagram,
            Err(error) => {
                warn!(%error, in_use = self.pool.in_use(), "no buffer for synthetic datagram");
                self.counters.inc_alloc_failures();
                return true;
            }
        };
        match self.tx.try_enqueue(datagram) {
            Ok(()) => self.counters.inc_produced(),
            // The rejected datagram is dropped here, returning its buffer.
            Err(EnqueueError::Full(_)) => self.counters.inc_enqueue_failures(),
            Err(EnqueueError::Closed(_)) => debug!("queue closed; dropping datagram"),
        }
        true
    }

    fn build(&mut self) -> Result<Datagram, PoolError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let header = Ipv4Header::new(SOURCE_ADDR, DEST_ADDR, id, PROTOCOL);
        Datagram::build(&self.pool, &header, &synthetic_payload(id, self.payload_len))
    }
}
