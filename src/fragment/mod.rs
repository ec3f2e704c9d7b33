//! IPv4 fragmentation and reassembly.
//!
//! This module collects the wire-level types of the packet path: the IPv4
//! header codec, the flow key shared by a datagram's fragments, pool-backed
//! datagrams, and the [`Fragmenter`] / [`Reassembler`] pair. Each sub-module
//! focuses on a single concept; the flow table the reassembler relies on
//! lives in [`crate::flow`].

pub mod datagram;
pub mod error;
pub mod fragmenter;
pub mod header;
pub mod key;
pub mod reassembler;

pub use datagram::Datagram;
pub use error::{FragmentationError, HeaderError, ReassemblyError};
pub use fragmenter::{Fragment, FragmentBatch, Fragmenter};
pub use header::{FRAGMENT_UNIT, IPV4_HEADER_LEN, Ipv4Header, MAX_OFFSET_UNITS};
pub use key::FlowKey;
pub use reassembler::{Reassembler, Reassembly};

#[cfg(test)]
mod tests;
