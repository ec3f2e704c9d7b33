//! Minimal IPv4 header codec.
//!
//! Only the fields needed to identify and place a fragment are interpreted.
//! Options are rejected and the checksum is written as zero, as if offloaded
//! to the NIC.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut};

use super::HeaderError;

/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

const VERSION_IHL: u8 = 0x45;
const FLAG_DONT_FRAGMENT: u16 = 0x4000;
const FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const OFFSET_MASK: u16 = 0x1fff;

/// Fragment offsets are expressed in units of this many bytes.
pub const FRAGMENT_UNIT: usize = 8;

/// Largest encodable fragment offset, in [`FRAGMENT_UNIT`]s.
pub const MAX_OFFSET_UNITS: u16 = OFFSET_MASK;

/// Decoded IPv4 header.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
///
/// use ipfrag::fragment::Ipv4Header;
/// let header = Ipv4Header::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 7, 17)
///     .with_total_len(40)
///     .with_fragment(2, true);
/// let mut wire = Vec::new();
/// header.encode(&mut wire);
/// assert_eq!(Ipv4Header::decode(&wire), Ok(header));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    tos: u8,
    total_len: u16,
    id: u16,
    dont_fragment: bool,
    more_fragments: bool,
    offset_units: u16,
    ttl: u8,
    protocol: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Header for an unfragmented datagram with no payload.
    #[must_use]
    pub const fn new(src: Ipv4Addr, dst: Ipv4Addr, id: u16, protocol: u8) -> Self {
        Self {
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16,
            id,
            dont_fragment: false,
            more_fragments: false,
            offset_units: 0,
            ttl: 64,
            protocol,
            src,
            dst,
        }
    }

    #[must_use]
    pub const fn with_total_len(mut self, total_len: u16) -> Self {
        self.total_len = total_len;
        self
    }

    /// Set the fragment offset (in 8-byte units) and the MF flag.
    #[must_use]
    pub const fn with_fragment(mut self, offset_units: u16, more_fragments: bool) -> Self {
        self.offset_units = offset_units & OFFSET_MASK;
        self.more_fragments = more_fragments;
        self
    }

    #[must_use]
    pub const fn with_dont_fragment(mut self, dont_fragment: bool) -> Self {
        self.dont_fragment = dont_fragment;
        self
    }

    /// Parse a header from the start of `wire`.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the buffer is short, the version is not
    /// 4, options are present, or the total length is smaller than the
    /// header.
    pub fn decode(mut wire: &[u8]) -> Result<Self, HeaderError> {
        if wire.len() < IPV4_HEADER_LEN {
            return Err(HeaderError::Truncated { len: wire.len() });
        }
        let version_ihl = wire.get_u8();
        if version_ihl >> 4 != 4 {
            return Err(HeaderError::Version(version_ihl >> 4));
        }
        if version_ihl != VERSION_IHL {
            return Err(HeaderError::Options(version_ihl & 0x0f));
        }
        let tos = wire.get_u8();
        let total_len = wire.get_u16();
        if usize::from(total_len) < IPV4_HEADER_LEN {
            return Err(HeaderError::TotalLength(total_len));
        }
        let id = wire.get_u16();
        let flags_offset = wire.get_u16();
        let ttl = wire.get_u8();
        let protocol = wire.get_u8();
        let _checksum = wire.get_u16();
        let src = Ipv4Addr::from(wire.get_u32());
        let dst = Ipv4Addr::from(wire.get_u32());

        Ok(Self {
            tos,
            total_len,
            id,
            dont_fragment: flags_offset & FLAG_DONT_FRAGMENT != 0,
            more_fragments: flags_offset & FLAG_MORE_FRAGMENTS != 0,
            offset_units: flags_offset & OFFSET_MASK,
            ttl,
            protocol,
            src,
            dst,
        })
    }

    /// Write the 20-byte wire form into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut flags_offset = self.offset_units;
        if self.dont_fragment {
            flags_offset |= FLAG_DONT_FRAGMENT;
        }
        if self.more_fragments {
            flags_offset |= FLAG_MORE_FRAGMENTS;
        }
        dst.put_u8(VERSION_IHL);
        dst.put_u8(self.tos);
        dst.put_u16(self.total_len);
        dst.put_u16(self.id);
        dst.put_u16(flags_offset);
        dst.put_u8(self.ttl);
        dst.put_u8(self.protocol);
        dst.put_u16(0);
        dst.put_u32(self.src.into());
        dst.put_u32(self.dst.into());
    }

    /// Wire form as a fixed-size array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut out = [0_u8; IPV4_HEADER_LEN];
        let mut cursor = &mut out[..];
        self.encode(&mut cursor);
        out
    }

    #[must_use]
    pub const fn total_len(&self) -> u16 { self.total_len }

    /// Payload bytes carried after the header.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(IPV4_HEADER_LEN)
    }

    #[must_use]
    pub const fn id(&self) -> u16 { self.id }

    #[must_use]
    pub const fn src(&self) -> Ipv4Addr { self.src }

    #[must_use]
    pub const fn dst(&self) -> Ipv4Addr { self.dst }

    #[must_use]
    pub const fn protocol(&self) -> u8 { self.protocol }

    #[must_use]
    pub const fn ttl(&self) -> u8 { self.ttl }

    #[must_use]
    pub const fn tos(&self) -> u8 { self.tos }

    #[must_use]
    pub const fn dont_fragment(&self) -> bool { self.dont_fragment }

    #[must_use]
    pub const fn more_fragments(&self) -> bool { self.more_fragments }

    /// Offset in [`FRAGMENT_UNIT`]s.
    #[must_use]
    pub const fn offset_units(&self) -> u16 { self.offset_units }

    /// Offset of this fragment's payload within the original payload.
    #[must_use]
    pub const fn offset_bytes(&self) -> usize { self.offset_units as usize * FRAGMENT_UNIT }

    /// Whether this header describes a fragment rather than a whole datagram.
    #[must_use]
    pub const fn is_fragment(&self) -> bool { self.more_fragments || self.offset_units != 0 }
}
