//! Unit tests for the fragmentation and reassembly subsystem.
//!
//! Tests are split into focused submodules to keep each file short and easy
//! to navigate.

use std::net::Ipv4Addr;

use rstest::fixture;

use crate::{
    fragment::{Datagram, Ipv4Header},
    pool::PacketPool,
};


pub(super) const SRC: Ipv4Addr = Ipv4Addr::new(2, 3, 4, 5);
pub(super) const DST: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);

#[fixture]
pub(super) fn pool() -> PacketPool { PacketPool::new(64, 2048).expect("pool geometry is valid") }

/// Payload whose bytes encode their own position so misplaced chunks show.
pub(super) fn patterned(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).expect("modulus fits in u8"))
        .collect()
}

pub(super) fn header(id: u16) -> Ipv4Header { Ipv4Header::new(SRC, DST, id, 17) }

/// Build a `total_len`-byte datagram (header included).
pub(super) fn datagram(pool: &PacketPool, id: u16, total_len: usize) -> Datagram {
    let payload = patterned(total_len - crate::fragment::IPV4_HEADER_LEN);
    Datagram::build(pool, &header(id), &payload).expect("datagram fits the pool")
}
