//! Bucketed flow table with LRU eviction and TTL expiry.
//!
//! Slots are grouped into power-of-two buckets selected by a hash of the
//! [`FlowKey`]. A record only ever lives in its key's bucket, so lookup is a
//! scan of one bucket. All live records are also threaded on an LRU list;
//! expiry sweeps walk it from the oldest end and stop at the first record
//! still within its TTL.

use std::{
    hash::{BuildHasher, RandomState},
    ops::Range,
    time::Instant,
};

use super::{DeathRow, FlowRecord, FlowState, FlowTableConfig, FlowTableStats, lru::LruList};
use crate::{fragment::FlowKey, metrics};

/// Position of a live record inside a [`FlowTable`].
///
/// A handle is only meaningful until the record it names is detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowHandle(usize);

/// Fixed-capacity table of in-progress reassemblies.
#[derive(Debug)]
pub struct FlowTable {
    config: FlowTableConfig,
    slots: Vec<Option<FlowRecord>>,
    lru: LruList,
    bucket_width: usize,
    bucket_mask: usize,
    hasher: RandomState,
    live: usize,
    stats: FlowTableStats,
}

impl FlowTable {
    /// Allocate every slot up front.
    #[must_use]
    pub fn new(config: FlowTableConfig) -> Self {
        let bucket_width = config.bucket_width();
        let bucket_count = config.bucket_count();
        let slot_count = bucket_width * bucket_count;
        Self {
            config,
            slots: std::iter::repeat_with(|| None).take(slot_count).collect(),
            lru: LruList::new(slot_count),
            bucket_width,
            bucket_mask: bucket_count - 1,
            hasher: RandomState::new(),
            live: 0,
            stats: FlowTableStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlowTableConfig { &self.config }

    /// Live records.
    #[must_use]
    pub fn len(&self) -> usize { self.live }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.live == 0 }

    /// Maximum number of live records.
    #[must_use]
    pub fn capacity(&self) -> usize { self.config.max_flows.get() }

    /// Total slots across all buckets.
    #[must_use]
    pub fn slot_count(&self) -> usize { self.slots.len() }

    #[must_use]
    pub fn stats(&self) -> &FlowTableStats { &self.stats }

    #[must_use]
    pub fn get(&self, handle: FlowHandle) -> Option<&FlowRecord> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, handle: FlowHandle) -> Option<&mut FlowRecord> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Find the live record for `key` without touching it or the stats.
    #[must_use]
    pub fn find(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.find_slot(self.bucket_of(key), key)
            .and_then(|slot| self.slots[slot].as_ref())
    }

    /// Live records from least to most recently touched.
    pub fn lru(&self) -> impl Iterator<Item = &FlowRecord> + '_ {
        self.lru.iter().filter_map(|slot| self.slots[slot].as_ref())
    }

    /// Return the record for `key`, creating one if needed.
    ///
    /// A record that has outlived the TTL is retired as expired and
    /// replaced by a fresh one. When `key` is absent, admission prefers an
    /// expired record in the key's bucket, then evicts the globally oldest
    /// record if the table is at its flow limit, then takes a free slot in
    /// the bucket. If the bucket is still full while the table is under its
    /// flow limit, the bucket's own least recently used record is evicted
    /// rather than the globally oldest one. Retired records are handed to
    /// `death_row`.
    pub fn lookup_or_create(
        &mut self,
        key: FlowKey,
        now: Instant,
        death_row: &mut DeathRow,
    ) -> (FlowHandle, &mut FlowRecord) {
        self.stats.lookups += 1;
        let bucket = self.bucket_of(&key);
        let slot = match self.find_slot(bucket, &key) {
            Some(slot) if !self.slot_expired(slot, now) => {
                self.stats.hits += 1;
                slot
            }
            Some(slot) => {
                self.retire(slot, FlowState::Expired, death_row);
                self.stats.stale_reused += 1;
                self.occupy(slot, key, now)
            }
            None => {
                let slot = self.admit(bucket, now, death_row);
                self.occupy(slot, key, now)
            }
        };
        let record = self.slots[slot].get_or_insert_with(|| FlowRecord::new(key, now));
        (FlowHandle(slot), record)
    }

    /// Refresh the record's timestamp and move it to the most recently used
    /// end.
    pub fn touch(&mut self, handle: FlowHandle, now: Instant) {
        if let Some(record) = self.slots.get_mut(handle.0).and_then(Option::as_mut) {
            record.touch(now);
            self.lru.move_to_back(handle.0);
        }
    }

    /// Remove and return the least recently used record as evicted.
    pub fn evict_oldest(&mut self) -> Option<FlowRecord> {
        let slot = self.lru.front()?;
        self.detach_slot(slot, FlowState::Evicted)
    }

    /// Remove the record at `handle`, marking it with `fate`.
    pub fn detach(&mut self, handle: FlowHandle, fate: FlowState) -> Option<FlowRecord> {
        self.detach_slot(handle.0, fate)
    }

    /// Retire records idle for longer than the TTL, oldest first.
    ///
    /// Retires the whole run of expired records and stops at the first one
    /// still within its TTL. Their buffers go to `death_row`; releasing them
    /// is left to [`DeathRow::drain`]. Returns the number retired.
    pub fn check_expired(&mut self, now: Instant, death_row: &mut DeathRow) -> usize {
        let mut retired = 0;
        while let Some(slot) = self.lru.front() {
            let Some(record) = self.slots[slot].as_ref() else {
                break;
            };
            if !self.is_expired(record, now) {
                break;
            }
            self.retire(slot, FlowState::Expired, death_row);
            retired += 1;
        }
        retired
    }

    pub(crate) fn bucket_of(&self, key: &FlowKey) -> usize {
        // Truncating the hash is fine; only the low bits select a bucket.
        #[expect(clippy::cast_possible_truncation, reason = "masked to bucket count")]
        let hash = self.hasher.hash_one(key) as usize;
        hash & self.bucket_mask
    }

    fn bucket_slots(&self, bucket: usize) -> Range<usize> {
        let start = bucket * self.bucket_width;
        start..start + self.bucket_width
    }

    fn find_slot(&self, bucket: usize, key: &FlowKey) -> Option<usize> {
        self.bucket_slots(bucket).find(|&slot| {
            self.slots[slot]
                .as_ref()
                .is_some_and(|record| record.key() == *key)
        })
    }

    fn is_expired(&self, record: &FlowRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.last_touched()) > self.config.ttl
    }

    fn slot_expired(&self, slot: usize, now: Instant) -> bool {
        self.slots[slot]
            .as_ref()
            .is_some_and(|record| self.is_expired(record, now))
    }

    /// Pick a free slot in `bucket`, making room if necessary.
    fn admit(&mut self, bucket: usize, now: Instant, death_row: &mut DeathRow) -> usize {
        let slots = self.bucket_slots(bucket);

        if let Some(slot) = slots.clone().find(|&slot| self.slot_expired(slot, now)) {
            self.retire(slot, FlowState::Expired, death_row);
            self.stats.stale_reused += 1;
            return slot;
        }

        if self.live >= self.capacity() {
            if let Some(oldest) = self.evict_oldest() {
                death_row.bury(oldest);
            }
        }

        if let Some(slot) = slots.clone().find(|&slot| self.slots[slot].is_none()) {
            return slot;
        }

        let victim = slots
            .clone()
            .min_by_key(|&slot| self.slots[slot].as_ref().map(FlowRecord::last_touched))
            .unwrap_or(slots.start);
        self.stats.bucket_overflows += 1;
        self.retire(victim, FlowState::Evicted, death_row);
        victim
    }

    fn occupy(&mut self, slot: usize, key: FlowKey, now: Instant) -> usize {
        debug_assert!(self.slots[slot].is_none(), "slot {slot} already occupied");
        self.slots[slot] = Some(FlowRecord::new(key, now));
        self.lru.push_back(slot);
        self.live += 1;
        self.stats.created += 1;
        slot
    }

    fn retire(&mut self, slot: usize, fate: FlowState, death_row: &mut DeathRow) {
        if let Some(record) = self.detach_slot(slot, fate) {
            death_row.bury(record);
        }
    }

    fn detach_slot(&mut self, slot: usize, fate: FlowState) -> Option<FlowRecord> {
        let mut record = self.slots.get_mut(slot)?.take()?;
        self.lru.unlink(slot);
        self.live -= 1;
        record.retire(fate);
        self.stats.record_fate(fate);
        metrics::inc_flows_retired(fate);
        Some(record)
    }
}

#[cfg(test)]
impl FlowTable {
    /// Number of records linked on the LRU list.
    pub(crate) fn lru_len(&self) -> usize { self.lru.len() }
}
