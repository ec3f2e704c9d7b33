//! Error types emitted by the fragmentation and reassembly layer.
//!
//! Fragmentation failures only ever cost the datagram being split.
//! Reassembly failures carry the flow they hit so the consumer can log them
//! with context; whether the flow survived is recorded per variant.

use thiserror::Error;

use super::{FlowKey, IPV4_HEADER_LEN};
use crate::pool::PoolError;

/// Malformed IPv4 header.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("buffer of {len} bytes is shorter than a {min}-byte header", min = IPV4_HEADER_LEN)]
    Truncated { len: usize },
    #[error("unsupported IP version {0}")]
    Version(u8),
    #[error("header options are not supported (ihl {0})")]
    Options(u8),
    #[error("total length {0} is shorter than the header")]
    TotalLength(u16),
    #[error("total length {declared} does not match buffer length {actual}")]
    LengthMismatch { declared: u16, actual: usize },
}

/// Errors produced while splitting a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentationError {
    /// The datagram cannot hold even a header.
    #[error(
        "datagram of {len} bytes is shorter than a {min}-byte header",
        min = IPV4_HEADER_LEN
    )]
    Truncated { len: usize },
    /// The header could not be parsed.
    #[error("malformed datagram header: {0}")]
    Header(#[from] HeaderError),
    /// The MTU leaves no room for an 8-byte aligned payload.
    #[error("mtu {mtu} leaves no room for fragment payload")]
    MtuTooSmall { mtu: usize },
    /// Splitting would produce more fragments than a flow can hold.
    #[error("datagram needs {needed} fragments, limit is {limit}")]
    TooManyFragments { needed: usize, limit: usize },
    /// The datagram exceeds the MTU but forbids fragmentation.
    #[error("datagram of {len} bytes exceeds mtu {mtu} with don't-fragment set")]
    DontFragment { len: usize, mtu: usize },
    /// A fragment would start beyond the 13-bit offset field.
    #[error("fragment offset {offset} does not fit the header offset field")]
    OffsetOverflow { offset: usize },
}

/// Errors produced while feeding a fragment to the reassembler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The fragment overlaps data already stored for the flow. The fragment
    /// is dropped; the flow is untouched.
    #[error("fragment [{start}, {end}) overlaps stored data for flow {key}")]
    DuplicateFragment {
        key: FlowKey,
        start: usize,
        end: usize,
    },
    /// The fragment contradicts what the flow already knows about the
    /// datagram's length. The flow is discarded.
    #[error("inconsistent fragment for flow {key}: {reason}")]
    Inconsistent { key: FlowKey, reason: &'static str },
    /// The flow already holds the maximum number of fragments. The flow is
    /// discarded.
    #[error("flow {key} exceeded {limit} fragments")]
    TooManyFragments { key: FlowKey, limit: usize },
    /// No buffer was available for the reassembled datagram. The flow is
    /// discarded.
    #[error("cannot build reassembled datagram for flow {key}: {source}")]
    Pool { key: FlowKey, source: PoolError },
}

impl ReassemblyError {
    /// Whether the error caused the whole flow to be dropped.
    #[must_use]
    pub fn discards_flow(&self) -> bool { !matches!(self, Self::DuplicateFragment { .. }) }
}
