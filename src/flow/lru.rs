//! Index-linked least-recently-used ordering over flow table slots.
//!
//! Links live in a vector parallel to the slot array, so moving a record to
//! the back is two pointer swaps with no allocation.

#[derive(Clone, Copy, Debug, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
}

/// Doubly linked list threaded through slot indices. The front is the least
/// recently used slot.
#[derive(Debug)]
pub(crate) struct LruList {
    links: Vec<Link>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl LruList {
    pub(crate) fn new(slots: usize) -> Self {
        Self {
            links: vec![Link::default(); slots],
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize { self.len }

    pub(crate) fn front(&self) -> Option<usize> { self.head }

    /// Append `slot` as the most recently used entry.
    pub(crate) fn push_back(&mut self, slot: usize) {
        debug_assert!(!self.links[slot].linked, "slot {slot} linked twice");
        self.links[slot] = Link {
            prev: self.tail,
            next: None,
            linked: true,
        };
        match self.tail {
            Some(tail) => self.links[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
    }

    /// Remove `slot` from the ordering. Unlinked slots are ignored.
    pub(crate) fn unlink(&mut self, slot: usize) {
        let Link { prev, next, linked } = self.links[slot];
        if !linked {
            return;
        }
        match prev {
            Some(prev) => self.links[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.links[next].prev = prev,
            None => self.tail = prev,
        }
        self.links[slot] = Link::default();
        self.len -= 1;
    }

    pub(crate) fn move_to_back(&mut self, slot: usize) {
        if self.tail == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_back(slot);
    }

    /// Slots from least to most recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.head, |&slot| self.links[slot].next)
    }
}
