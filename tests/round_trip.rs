//! End-to-end fragmentation and reassembly through the public API.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use ipfrag::{
    Datagram,
    FlowState,
    FlowTableConfig,
    Fragment,
    Fragmenter,
    Ipv4Header,
    PacketPool,
    Reassembler,
    Reassembly,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};

const TTL: Duration = Duration::from_millis(500);

fn nz(value: usize) -> NonZeroUsize { NonZeroUsize::new(value).expect("non-zero") }

#[fixture]
fn pool() -> PacketPool { PacketPool::new(128, 2048).expect("pool geometry is valid") }

fn build(pool: &PacketPool, id: u16, payload: &[u8]) -> Datagram {
    let header = Ipv4Header::new([192, 0, 2, 1].into(), [198, 51, 100, 7].into(), id, 17);
    Datagram::build(pool, &header, payload).expect("datagram fits")
}

fn reassemble_all(
    reassembler: &mut Reassembler,
    fragments: Vec<Fragment>,
    now: Instant,
) -> Vec<Vec<u8>> {
    fragments
        .into_iter()
        .filter_map(|fragment| {
            reassembler
                .accept(fragment, now)
                .expect("well-formed fragment")
                .into_datagram()
                .map(|dgram| dgram.as_bytes().to_vec())
        })
        .collect()
}

#[rstest]
fn ethernet_scenario_round_trips_in_reverse(pool: PacketPool) {
    let payload: Vec<u8> = (0..1490_u32).map(|i| (i * 7 % 256) as u8).collect();
    let dgram = build(&pool, 0x1234, &payload);
    let original = dgram.as_bytes().to_vec();

    let fragmenter = Fragmenter::new(nz(1500), nz(4));
    let mut fragments = fragmenter.fragment(dgram).expect("splits").into_fragments();
    let offsets: Vec<u16> = fragments.iter().map(|f| f.header().offset_units()).collect();
    assert_eq!(offsets, vec![0, 185]);
    fragments.reverse();

    let mut reassembler = Reassembler::new(FlowTableConfig::new(nz(16), TTL), pool.clone());
    let rebuilt = reassemble_all(&mut reassembler, fragments, Instant::now());

    assert_eq!(rebuilt, vec![original]);
    assert_eq!(reassembler.drain_death_row(usize::MAX), 2);
    assert_eq!(pool.in_use(), 0);
}

#[rstest]
fn interleaved_flows_complete_independently(pool: PacketPool) {
    let fragmenter = Fragmenter::new(nz(576), nz(4));
    let mut originals = Vec::new();
    let mut lanes = Vec::new();
    for id in 0..3_u16 {
        let dgram = build(&pool, id, &vec![u8::try_from(id).expect("small"); 1200]);
        originals.push(dgram.as_bytes().to_vec());
        lanes.push(fragmenter.fragment(dgram).expect("splits").into_fragments());
    }

    // Round-robin across flows, last fragment first within each.
    let mut interleaved = Vec::new();
    while lanes.iter().any(|lane| !lane.is_empty()) {
        for lane in &mut lanes {
            if let Some(fragment) = lane.pop() {
                interleaved.push(fragment);
            }
        }
    }

    let mut reassembler = Reassembler::new(FlowTableConfig::new(nz(16), TTL), pool.clone());
    let mut rebuilt = reassemble_all(&mut reassembler, interleaved, Instant::now());
    rebuilt.sort();
    originals.sort();
    assert_eq!(rebuilt, originals);
    assert!(reassembler.table().is_empty());
}

#[rstest]
fn error_mode_scenario_expires_after_ttl(pool: PacketPool) {
    let dgram = build(&pool, 77, &[0x5a; 1380]);
    let mut fragments = Fragmenter::new(nz(500), nz(4))
        .fragment(dgram)
        .expect("splits")
        .into_fragments();
    assert_eq!(fragments.len(), 3);
    fragments.pop();

    let start = Instant::now();
    let mut reassembler = Reassembler::new(FlowTableConfig::new(nz(16), TTL), pool.clone());
    assert!(reassemble_all(&mut reassembler, fragments, start).is_empty());
    assert_eq!(
        reassembler.table().lru().next().map(ipfrag::FlowRecord::state),
        Some(FlowState::Collecting)
    );

    reassembler.collect_garbage(start + TTL + Duration::from_millis(1));
    assert!(reassembler.table().is_empty());
    assert_eq!(reassembler.death_row().len(), 2);
    reassembler.drain_death_row(32);
    assert_eq!(pool.in_use(), 0);
}

#[rstest]
fn one_flow_capacity_evicts_the_first_key(pool: PacketPool) {
    let fragmenter = Fragmenter::new(nz(1500), nz(4));
    let first = fragmenter
        .fragment(build(&pool, 1, &[1; 2000]))
        .expect("splits")
        .into_fragments()
        .remove(0);
    let first_key = first.key();
    let second = fragmenter
        .fragment(build(&pool, 2, &[2; 2000]))
        .expect("splits")
        .into_fragments()
        .remove(0);

    let now = Instant::now();
    let mut reassembler = Reassembler::new(FlowTableConfig::new(nz(1), TTL), pool);
    assert!(matches!(reassembler.accept(first, now), Ok(Reassembly::Incomplete)));
    assert!(matches!(
        reassembler.accept(second, now + Duration::from_millis(1)),
        Ok(Reassembly::Incomplete)
    ));

    assert_eq!(reassembler.table().len(), 1);
    assert!(reassembler.table().find(&first_key).is_none());
    assert_eq!(reassembler.table().stats().evicted, 1);
}

proptest! {
    #[test]
    fn any_permutation_rebuilds_byte_exact_copy(
        payload in proptest::collection::vec(any::<u8>(), 0..1900),
        mtu in 68_usize..=1500,
        seed in any::<u64>(),
    ) {
        let pool = PacketPool::new(16, 2048).expect("pool geometry is valid");
        let dgram = build(&pool, 4242, &payload);
        let original = dgram.as_bytes().to_vec();
        let fragmenter = Fragmenter::new(nz(mtu), nz(64));
        let mut fragments = fragmenter.fragment(dgram).expect("splits").into_fragments();

        // Fisher-Yates shuffle driven by a small LCG over `seed`.
        let mut state = seed;
        for i in (1..fragments.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let j = usize::try_from(state >> 33).expect("fits") % (i + 1);
            fragments.swap(i, j);
        }

        let config = FlowTableConfig::new(nz(4), TTL).with_max_fragments(nz(64));
        let mut reassembler = Reassembler::new(config, pool.clone());
        let rebuilt = reassemble_all(&mut reassembler, fragments, Instant::now());

        prop_assert_eq!(rebuilt, vec![original]);
        reassembler.drain_death_row(usize::MAX);
        prop_assert_eq!(pool.in_use(), 0);
    }
}
