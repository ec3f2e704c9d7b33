//! Unit tests for flow table admission, LRU ordering and expiry.

use std::{
    net::{IpAddr, Ipv4Addr},
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use bytes::Bytes;
use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::{DeathRow, FlowState, FlowTable, FlowTableConfig, Insertion};
use crate::fragment::{FlowKey, Fragment, Ipv4Header};

const TTL: Duration = Duration::from_millis(100);

fn nz(value: usize) -> NonZeroUsize { NonZeroUsize::new(value).expect("non-zero") }

fn key(id: u32) -> FlowKey {
    FlowKey {
        src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        id,
        protocol: 17,
    }
}

fn fragment(offset_units: u16, more: bool, len: usize) -> Fragment {
    let header = Ipv4Header::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 1, 17)
        .with_fragment(offset_units, more);
    Fragment::new(header, Bytes::from(vec![1; len]))
}

#[fixture]
fn death_row() -> DeathRow { DeathRow::new(nz(64)) }

#[fixture]
fn t0() -> Instant { Instant::now() }

fn table(max_flows: usize, bucket_entries: usize) -> FlowTable {
    FlowTable::new(FlowTableConfig::new(nz(max_flows), TTL).with_bucket_entries(nz(bucket_entries)))
}

fn live_ids(table: &FlowTable) -> Vec<u32> { table.lru().map(|record| record.key().id).collect() }

#[rstest]
#[case(4096, 16, 256)]
#[case(1, 16, 1)]
#[case(100, 16, 8)]
#[case(5, 3, 2)]
fn geometry_rounds_to_powers_of_two(
    #[case] max_flows: usize,
    #[case] entries: usize,
    #[case] buckets: usize,
) {
    let config = FlowTableConfig::new(nz(max_flows), TTL).with_bucket_entries(nz(entries));
    assert_eq!(config.bucket_count(), buckets);
    assert!(FlowTable::new(config).slot_count() >= max_flows);
}

#[rstest]
fn lookup_hits_existing_record(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(8, 4);
    let (first, _) = table.lookup_or_create(key(1), t0, &mut death_row);
    let (again, record) = table.lookup_or_create(key(1), t0, &mut death_row);

    assert_eq!(first, again);
    assert_eq!(record.state(), FlowState::Empty);
    assert_eq!(table.len(), 1);
    let stats = table.stats();
    assert_eq!((stats.lookups, stats.hits, stats.created), (2, 1, 1));
}

#[rstest]
fn touch_moves_record_to_most_recent(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(8, 8);
    let mut handles = Vec::new();
    for id in 1..=3 {
        handles.push(table.lookup_or_create(key(id), t0, &mut death_row).0);
    }
    assert_eq!(live_ids(&table), vec![1, 2, 3]);

    table.touch(handles[0], t0 + Duration::from_millis(1));
    assert_eq!(live_ids(&table), vec![2, 3, 1]);

    let oldest = table.evict_oldest().expect("non-empty");
    assert_eq!(oldest.key(), key(2));
    assert_eq!(oldest.state(), FlowState::Evicted);
    assert_eq!(table.len(), 2);
}

#[rstest]
fn full_table_evicts_globally_oldest(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(4, 16);
    for id in 0..6 {
        let now = t0 + Duration::from_millis(u64::from(id));
        table.lookup_or_create(key(id), now, &mut death_row);
        assert!(table.len() <= 4);
    }
    assert_eq!(live_ids(&table), vec![2, 3, 4, 5]);
    assert_eq!(table.stats().evicted, 2);
    assert_eq!(table.lru_len(), 4);
}

#[rstest]
fn full_bucket_evicts_its_own_oldest(mut death_row: DeathRow, t0: Instant) {
    // Two buckets of two slots; find three keys sharing a bucket.
    let mut table = table(4, 2);
    let target = table.bucket_of(&key(0));
    let same_bucket: Vec<u32> = (0..)
        .filter(|&id| table.bucket_of(&key(id)) == target)
        .take(3)
        .collect();

    for (step, &id) in same_bucket.iter().enumerate() {
        let now = t0 + Duration::from_millis(step as u64);
        table.lookup_or_create(key(id), now, &mut death_row);
    }

    assert_eq!(table.len(), 2);
    assert!(table.find(&key(same_bucket[0])).is_none());
    assert_eq!(table.stats().bucket_overflows, 1);
    assert_eq!(table.stats().evicted, 1);
}

#[rstest]
fn expired_record_in_bucket_is_reused(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(1, 1);
    table.lookup_or_create(key(1), t0, &mut death_row);
    let later = t0 + TTL + Duration::from_millis(1);
    table.lookup_or_create(key(2), later, &mut death_row);

    let stats = table.stats();
    assert_eq!(stats.stale_reused, 1);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.evicted, 0);
    assert_eq!(live_ids(&table), vec![2]);
}

#[rstest]
fn sweep_stops_at_first_live_record(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(8, 8);
    for id in 0..3 {
        table.lookup_or_create(key(id), t0, &mut death_row);
    }
    let late = t0 + TTL / 2;
    table.lookup_or_create(key(9), late, &mut death_row);

    assert_eq!(table.check_expired(t0 + TTL, &mut death_row), 0);
    assert_eq!(
        table.check_expired(t0 + TTL + Duration::from_millis(1), &mut death_row),
        3
    );
    assert_eq!(live_ids(&table), vec![9]);
    assert_eq!(table.stats().expired, 3);
}

#[rstest]
fn sweep_retires_every_expired_record_past_a_busy_death_row(t0: Instant) {
    let mut death_row = DeathRow::new(nz(2));
    death_row.defer(Bytes::from_static(b"pending"));
    let mut table = table(1024, 16);
    for id in 0..100 {
        let (handle, record) = table.lookup_or_create(key(id), t0, &mut death_row);
        assert!(matches!(
            record.insert(fragment(0, true, 8), 4),
            Ok(Insertion::Stored)
        ));
        assert!(matches!(
            record.insert(fragment(1, true, 8), 4),
            Ok(Insertion::Stored)
        ));
        table.touch(handle, t0);
    }

    assert_eq!(table.check_expired(t0 + TTL * 2, &mut death_row), 100);
    assert!(table.is_empty());
    assert_eq!(table.stats().expired, 100);
    assert_eq!(death_row.len(), 201);

    assert_eq!(death_row.drain(32), 32);
    assert_eq!(death_row.len(), 169);
}

#[rstest]
fn detach_reports_fate(mut death_row: DeathRow, t0: Instant) {
    let mut table = table(8, 8);
    let (handle, _) = table.lookup_or_create(key(7), t0, &mut death_row);
    let record = table.detach(handle, FlowState::Discarded).expect("live");
    assert_eq!(record.state(), FlowState::Discarded);
    assert!(table.detach(handle, FlowState::Discarded).is_none());
    assert!(table.get(handle).is_none());
    assert_eq!(table.stats().discarded, 1);
    assert_eq!(table.stats().retired(), 1);
}

#[test]
fn record_tracks_coverage_and_total() {
    let mut table = table(8, 8);
    let mut death_row = DeathRow::new(nz(8));
    let (_, record) = table.lookup_or_create(key(1), Instant::now(), &mut death_row);

    assert!(matches!(record.insert(fragment(2, false, 5), 4), Ok(Insertion::Stored)));
    assert_eq!(record.total_len(), Some(21));
    assert!(matches!(record.insert(fragment(0, true, 8), 4), Ok(Insertion::Stored)));
    assert_eq!(record.covered_ranges(), vec![(0, 8), (16, 21)]);
    assert!(matches!(record.insert(fragment(1, true, 8), 4), Ok(Insertion::Complete)));
    assert_eq!(record.covered_ranges(), vec![(0, 21)]);
    assert!(record.is_complete());
    assert_eq!(record.template().map(Ipv4Header::offset_units), Some(0));
}

proptest! {
    #[test]
    fn live_records_never_exceed_capacity(
        max_flows in 1_usize..32,
        ids in proptest::collection::vec(0_u32..64, 1..200),
    ) {
        let mut table = table(max_flows, 4);
        let mut death_row = DeathRow::new(nz(1024));
        let start = Instant::now();
        for (step, id) in ids.into_iter().enumerate() {
            let now = start + Duration::from_micros(step as u64);
            table.lookup_or_create(key(id), now, &mut death_row);
            prop_assert!(table.len() <= max_flows);
            prop_assert_eq!(table.lru().count(), table.len());
        }
    }
}
