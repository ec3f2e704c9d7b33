//! Whole IPv4 datagrams held in pool buffers.

use std::fmt;

use super::{HeaderError, IPV4_HEADER_LEN, Ipv4Header};
use crate::pool::{PacketBuf, PacketPool, PoolError};

/// A complete datagram, header included, stored in a [`PacketBuf`].
///
/// Dropping the datagram returns its buffer to the pool.
pub struct Datagram {
    buf: PacketBuf,
}

impl Datagram {
    /// Wrap wire bytes already written to `buf`.
    #[must_use]
    pub fn new(buf: PacketBuf) -> Self { Self { buf } }

    /// Allocate a buffer from `pool` and write `header` followed by `payload`.
    ///
    /// The header's total length is rewritten to match.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] if no buffer is free and
    /// [`PoolError::Overflow`] if the datagram does not fit one.
    pub fn build(pool: &PacketPool, header: &Ipv4Header, payload: &[u8]) -> Result<Self, PoolError> {
        Self::assemble(pool, header, [payload])
    }

    /// Like [`Datagram::build`], concatenating `parts` as the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] if no buffer is free and
    /// [`PoolError::Overflow`] if the datagram does not fit one.
    pub fn assemble<'a, I>(pool: &PacketPool, header: &Ipv4Header, parts: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = &'a [u8]>,
        I::IntoIter: Clone,
    {
        let parts = parts.into_iter();
        let total = IPV4_HEADER_LEN + parts.clone().map(<[u8]>::len).sum::<usize>();
        let overflow = PoolError::Overflow {
            attempted: total,
            capacity: pool.buffer_size(),
        };
        if total > pool.buffer_size() {
            return Err(overflow);
        }
        let total_len = u16::try_from(total).map_err(|_| overflow)?;

        let mut buf = pool.alloc()?;
        buf.put_slice(&header.with_total_len(total_len).to_bytes())?;
        for part in parts {
            buf.put_slice(part)?;
        }
        Ok(Self { buf })
    }

    /// Parse the header and check it against the buffer length.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] if the header is malformed or its total
    /// length disagrees with the bytes held.
    pub fn header(&self) -> Result<Ipv4Header, HeaderError> {
        let header = Ipv4Header::decode(self.as_bytes())?;
        if usize::from(header.total_len()) != self.len() {
            return Err(HeaderError::LengthMismatch {
                declared: header.total_len(),
                actual: self.len(),
            });
        }
        Ok(header)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { self.buf.as_slice() }

    #[must_use]
    pub fn len(&self) -> usize { self.buf.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Bytes following the header; empty for truncated datagrams.
    #[must_use]
    pub fn payload(&self) -> &[u8] { self.as_bytes().get(IPV4_HEADER_LEN..).unwrap_or(&[]) }

    #[must_use]
    pub fn into_buf(self) -> PacketBuf { self.buf }
}

impl fmt::Debug for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datagram")
            .field("len", &self.len())
            .field("header", &self.header().ok())
            .finish()
    }
}
