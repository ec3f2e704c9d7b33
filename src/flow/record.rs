//! Per-datagram reassembly state.

use std::time::Instant;

use bytes::Bytes;

use crate::fragment::{FRAGMENT_UNIT, FlowKey, Fragment, Ipv4Header};

/// Lifecycle of a [`FlowRecord`].
///
/// `Empty` and `Collecting` are live states; every other state is terminal
/// and is only observed on a record that has already left the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Empty,
    Collecting,
    /// Every byte was covered and the datagram was rebuilt.
    Complete,
    /// The record outlived the TTL.
    Expired,
    /// The record was recycled to admit a newer flow.
    Evicted,
    /// A fragment contradicted the record and it was dropped.
    Discarded,
}

impl FlowState {
    #[must_use]
    pub const fn is_terminal(self) -> bool { !matches!(self, Self::Empty | Self::Collecting) }

    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Collecting => "collecting",
            Self::Complete => "complete",
            Self::Expired => "expired",
            Self::Evicted => "evicted",
            Self::Discarded => "discarded",
        }
    }
}

/// One stored fragment: its payload and where it sits in the datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentEntry {
    offset: usize,
    more_fragments: bool,
    payload: Bytes,
}

impl FragmentEntry {
    #[must_use]
    pub fn new(offset: usize, more_fragments: bool, payload: Bytes) -> Self {
        Self {
            offset,
            more_fragments,
            payload,
        }
    }

    /// First payload byte covered, relative to the reassembled payload.
    #[must_use]
    pub fn start(&self) -> usize { self.offset }

    /// One past the last payload byte covered.
    #[must_use]
    pub fn end(&self) -> usize { self.offset + self.payload.len() }

    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    #[must_use]
    pub fn more_fragments(&self) -> bool { self.more_fragments }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }
}

/// Outcome of storing a fragment.
#[derive(Debug)]
pub(crate) enum Insertion {
    /// Stored; the datagram is still missing bytes.
    Stored,
    /// Stored; every byte is now covered.
    Complete,
    /// Same offset and length as a stored fragment. The copy is handed back
    /// for release and nothing changed.
    Duplicate(Bytes),
}

/// Why a fragment was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RejectKind {
    /// Overlaps stored data. The record is unaffected.
    Overlap { start: usize, end: usize },
    /// Contradicts what the record knows. The record must be discarded.
    Inconsistent(&'static str),
    /// The record is already full. The record must be discarded.
    TooManyFragments,
}

/// A refused fragment, with its payload handed back for release.
#[derive(Debug)]
pub(crate) struct Rejection {
    pub(crate) kind: RejectKind,
    pub(crate) payload: Bytes,
}

/// Reassembly state for one [`FlowKey`].
#[derive(Debug)]
pub struct FlowRecord {
    key: FlowKey,
    created_at: Instant,
    last_touched: Instant,
    state: FlowState,
    template: Option<Ipv4Header>,
    fragments: Vec<FragmentEntry>,
    total_len: Option<usize>,
    covered: usize,
}

impl FlowRecord {
    pub(crate) fn new(key: FlowKey, now: Instant) -> Self {
        Self {
            key,
            created_at: now,
            last_touched: now,
            state: FlowState::Empty,
            template: None,
            fragments: Vec::new(),
            total_len: None,
            covered: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> FlowKey { self.key }

    #[must_use]
    pub fn created_at(&self) -> Instant { self.created_at }

    #[must_use]
    pub fn last_touched(&self) -> Instant { self.last_touched }

    #[must_use]
    pub fn state(&self) -> FlowState { self.state }

    /// Payload length of the full datagram, once the terminal fragment has
    /// been seen.
    #[must_use]
    pub fn total_len(&self) -> Option<usize> { self.total_len }

    /// Payload bytes held so far.
    #[must_use]
    pub fn covered(&self) -> usize { self.covered }

    #[must_use]
    pub fn fragment_count(&self) -> usize { self.fragments.len() }

    /// Stored fragments in offset order.
    #[must_use]
    pub fn fragments(&self) -> &[FragmentEntry] { &self.fragments }

    /// Covered byte ranges, merged where adjacent.
    #[must_use]
    pub fn covered_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(self.fragments.len());
        for entry in &self.fragments {
            match ranges.last_mut() {
                Some((_, end)) if *end == entry.start() => *end = entry.end(),
                _ => ranges.push((entry.start(), entry.end())),
            }
        }
        ranges
    }

    /// Header to stamp on the rebuilt datagram; taken from the offset-zero
    /// fragment when it has arrived.
    #[must_use]
    pub fn template(&self) -> Option<&Ipv4Header> { self.template.as_ref() }

    #[must_use]
    pub fn is_complete(&self) -> bool { self.total_len == Some(self.covered) }

    pub(crate) fn touch(&mut self, now: Instant) { self.last_touched = now; }

    pub(crate) fn retire(&mut self, fate: FlowState) {
        debug_assert!(fate.is_terminal(), "records retire into terminal states");
        self.state = fate;
    }

    /// Release ownership of every stored payload.
    pub(crate) fn into_payloads(self) -> impl Iterator<Item = Bytes> {
        self.fragments.into_iter().map(|entry| entry.payload)
    }

    /// Store `fragment` if it fits the datagram described so far.
    pub(crate) fn insert(
        &mut self,
        fragment: Fragment,
        max_fragments: usize,
    ) -> Result<Insertion, Rejection> {
        let (header, payload) = fragment.into_parts();
        let start = header.offset_bytes();
        let end = start + payload.len();
        let terminal = !header.more_fragments();

        if self
            .fragments
            .iter()
            .any(|entry| entry.start() == start && entry.len() == payload.len())
        {
            return Ok(Insertion::Duplicate(payload));
        }

        let position = self.fragments.partition_point(|entry| entry.start() < start);
        let overlaps_previous = position
            .checked_sub(1)
            .and_then(|prev| self.fragments.get(prev))
            .is_some_and(|prev| prev.end() > start);
        let overlaps_next = self
            .fragments
            .get(position)
            .is_some_and(|next| next.start() < end);
        if overlaps_previous || overlaps_next {
            return Err(Rejection {
                kind: RejectKind::Overlap { start, end },
                payload,
            });
        }

        if let Some(reason) = self.contradiction(start, end, terminal) {
            return Err(Rejection {
                kind: RejectKind::Inconsistent(reason),
                payload,
            });
        }

        if self.fragments.len() >= max_fragments {
            return Err(Rejection {
                kind: RejectKind::TooManyFragments,
                payload,
            });
        }

        if terminal {
            self.total_len = Some(end);
        }
        if start == 0 || self.template.is_none() {
            self.template = Some(header);
        }
        self.covered += payload.len();
        self.fragments
            .insert(position, FragmentEntry::new(start, !terminal, payload));
        self.state = FlowState::Collecting;

        if self.is_complete() {
            Ok(Insertion::Complete)
        } else {
            Ok(Insertion::Stored)
        }
    }

    fn contradiction(&self, start: usize, end: usize, terminal: bool) -> Option<&'static str> {
        let len = end - start;
        if !terminal && (len == 0 || len % FRAGMENT_UNIT != 0) {
            return Some("non-terminal fragment length is not a positive multiple of 8");
        }
        if let Some(total) = self.total_len {
            if terminal && end != total {
                return Some("second terminal fragment declares a different length");
            }
            if end > total {
                return Some("fragment extends past the declared datagram end");
            }
        }
        if terminal && self.fragments.iter().any(|entry| entry.end() > end) {
            return Some("stored data extends past the terminal fragment");
        }
        None
    }
}
