//! Splits IPv4 datagrams into MTU-sized fragments.
//!
//! [`Fragmenter`] consumes a [`Datagram`] and yields a [`FragmentBatch`].
//! Every fragment payload is a zero-copy slice of the original pool buffer;
//! the buffer goes back to the pool once the last fragment is dropped.

use std::num::NonZeroUsize;

use bytes::{BufMut, Bytes};

use super::{
    Datagram,
    FRAGMENT_UNIT,
    FlowKey,
    FragmentationError,
    IPV4_HEADER_LEN,
    Ipv4Header,
    MAX_OFFSET_UNITS,
};

/// Splits datagrams that exceed the MTU.
#[derive(Clone, Copy, Debug)]
pub struct Fragmenter {
    mtu: NonZeroUsize,
    max_fragments: NonZeroUsize,
}

impl Fragmenter {
    /// Create a fragmenter emitting fragments of at most `mtu` bytes,
    /// header included, and refusing datagrams needing more than
    /// `max_fragments` pieces.
    #[must_use]
    pub const fn new(mtu: NonZeroUsize, max_fragments: NonZeroUsize) -> Self {
        Self { mtu, max_fragments }
    }

    #[must_use]
    pub const fn mtu(&self) -> NonZeroUsize { self.mtu }

    #[must_use]
    pub const fn max_fragments(&self) -> NonZeroUsize { self.max_fragments }

    /// Payload bytes carried by every fragment except the last.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.mtu.get().saturating_sub(IPV4_HEADER_LEN) / FRAGMENT_UNIT * FRAGMENT_UNIT
    }

    /// Split `datagram` into fragments.
    ///
    /// A datagram that already fits the MTU comes back as a single fragment
    /// with its header unchanged. The datagram is consumed either way.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::Truncated`] or
    /// [`FragmentationError::Header`] for malformed input,
    /// [`FragmentationError::DontFragment`] if the datagram forbids
    /// splitting, [`FragmentationError::MtuTooSmall`] if the MTU cannot carry
    /// an aligned payload, [`FragmentationError::TooManyFragments`] if the
    /// split exceeds the per-flow limit, and
    /// [`FragmentationError::OffsetOverflow`] if an offset does not fit the
    /// header.
    pub fn fragment(&self, datagram: Datagram) -> Result<FragmentBatch, FragmentationError> {
        let len = datagram.len();
        if len < IPV4_HEADER_LEN {
            return Err(FragmentationError::Truncated { len });
        }
        let header = datagram.header()?;
        let key = FlowKey::from(&header);
        let mtu = self.mtu.get();
        let payload = datagram.into_buf().freeze().slice(IPV4_HEADER_LEN..);

        if len <= mtu {
            return Ok(FragmentBatch::new(key, vec![Fragment::new(header, payload)]));
        }
        if header.dont_fragment() {
            return Err(FragmentationError::DontFragment { len, mtu });
        }

        let chunk = self.chunk_size();
        if chunk == 0 {
            return Err(FragmentationError::MtuTooSmall { mtu });
        }
        let needed = payload.len().div_ceil(chunk);
        if needed > self.max_fragments.get() {
            return Err(FragmentationError::TooManyFragments {
                needed,
                limit: self.max_fragments.get(),
            });
        }

        let base = header.offset_bytes();
        let mut fragments = Vec::with_capacity(needed);
        let mut start = 0;
        while start < payload.len() {
            let end = (start + chunk).min(payload.len());
            let last = end == payload.len();
            let offset = base + start;
            let offset_units = u16::try_from(offset / FRAGMENT_UNIT)
                .ok()
                .filter(|units| *units <= MAX_OFFSET_UNITS)
                .ok_or(FragmentationError::OffsetOverflow { offset })?;
            let total_len = u16::try_from(IPV4_HEADER_LEN + end - start)
                .map_err(|_| FragmentationError::OffsetOverflow { offset })?;
            // The final piece inherits the original flag so fragments of a
            // fragment still chain correctly.
            let more = if last { header.more_fragments() } else { true };
            let fragment_header = header
                .with_total_len(total_len)
                .with_fragment(offset_units, more);
            fragments.push(Fragment::new(fragment_header, payload.slice(start..end)));
            start = end;
        }

        Ok(FragmentBatch::new(key, fragments))
    }
}

/// One fragment: its own header plus a view of the payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    header: Ipv4Header,
    payload: Bytes,
}

impl Fragment {
    #[must_use]
    pub fn new(header: Ipv4Header, payload: Bytes) -> Self { Self { header, payload } }

    #[must_use]
    pub fn header(&self) -> &Ipv4Header { &self.header }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    #[must_use]
    pub fn key(&self) -> FlowKey { FlowKey::from(&self.header) }

    /// Payload position within the reassembled datagram.
    #[must_use]
    pub fn offset_bytes(&self) -> usize { self.header.offset_bytes() }

    #[must_use]
    pub fn encoded_len(&self) -> usize { IPV4_HEADER_LEN + self.payload.len() }

    /// Write header and payload to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        self.header.encode(dst);
        dst.put_slice(&self.payload);
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }

    #[must_use]
    pub fn into_parts(self) -> (Ipv4Header, Bytes) { (self.header, self.payload) }
}

/// Fragments produced from a single datagram, in offset order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentBatch {
    key: FlowKey,
    fragments: Vec<Fragment>,
}

impl FragmentBatch {
    fn new(key: FlowKey, fragments: Vec<Fragment>) -> Self {
        debug_assert!(!fragments.is_empty(), "fragment batches must not be empty");
        Self { key, fragments }
    }

    #[must_use]
    pub const fn key(&self) -> FlowKey { self.key }

    #[must_use]
    pub fn fragments(&self) -> &[Fragment] { self.fragments.as_slice() }

    #[expect(
        clippy::len_without_is_empty,
        reason = "batches are guaranteed non-empty"
    )]
    #[must_use]
    pub fn len(&self) -> usize { self.fragments.len() }

    /// Whether the datagram had to be split.
    #[must_use]
    pub fn is_fragmented(&self) -> bool { self.len() > 1 }

    #[must_use]
    pub fn into_fragments(self) -> Vec<Fragment> { self.fragments }
}

impl IntoIterator for FragmentBatch {
    type Item = Fragment;
    type IntoIter = std::vec::IntoIter<Fragment>;

    fn into_iter(self) -> Self::IntoIter { self.fragments.into_iter() }
}
