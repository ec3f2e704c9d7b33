#![cfg(feature = "metrics")]
//! Tests for `ipfrag` metrics helpers.
//!
//! Counters and gauges are observed through
//! `metrics_util::debugging::DebuggingRecorder`.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use ipfrag::{
    Datagram,
    FlowState,
    FlowTableConfig,
    Fragmenter,
    Ipv4Header,
    PacketPool,
    Reassembler,
    metrics as ipfrag_metrics,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

fn nz(value: usize) -> NonZeroUsize { NonZeroUsize::new(value).expect("non-zero") }

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_with_label(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(1)]
#[case(3)]
fn enqueue_failures_are_counted(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| ipfrag_metrics::inc_enqueue_failures());
    });

    assert_eq!(
        counter_with_label(&snapshotter, ipfrag_metrics::ENQUEUE_FAILURES, None),
        expected
    );
}

#[test]
fn pool_gauge_reports_latest_value() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        ipfrag_metrics::set_pool_in_use(7);
        ipfrag_metrics::set_pool_in_use(3);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == ipfrag_metrics::POOL_IN_USE
            && matches!(v, DebugValue::Gauge(g) if (g.0 - 3.0).abs() < f64::EPSILON)
    });
    assert!(found, "pool gauge not recorded: {metrics:#?}");
}

#[test]
fn reassembly_records_fragments_and_completion() {
    let pool = PacketPool::new(16, 2048).expect("pool geometry is valid");
    let header = Ipv4Header::new([10, 0, 0, 1].into(), [10, 0, 0, 2].into(), 5, 17);
    let dgram = Datagram::build(&pool, &header, &[0xab; 1490]).expect("fits");
    let fragments = Fragmenter::new(nz(1500), nz(4))
        .fragment(dgram)
        .expect("splits")
        .into_fragments();

    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let config = FlowTableConfig::new(nz(8), Duration::from_secs(1));
        let mut reassembler = Reassembler::new(config, pool.clone());
        let now = Instant::now();
        for fragment in fragments {
            reassembler.accept(fragment, now).expect("well-formed");
        }
    });

    assert_eq!(
        counter_with_label(&snapshotter, ipfrag_metrics::FRAGMENTS_PROCESSED, None),
        2
    );
    assert_eq!(
        counter_with_label(&snapshotter, ipfrag_metrics::DATAGRAMS_REASSEMBLED, None),
        1
    );
    assert_eq!(
        counter_with_label(
            &snapshotter,
            ipfrag_metrics::FLOWS_RETIRED,
            Some(("fate", FlowState::Complete.as_str()))
        ),
        1
    );
}

#[test]
fn expiry_is_labelled_by_fate() {
    let pool = PacketPool::new(16, 2048).expect("pool geometry is valid");
    let header = Ipv4Header::new([10, 0, 0, 1].into(), [10, 0, 0, 2].into(), 6, 17);
    let dgram = Datagram::build(&pool, &header, &[0xcd; 1490]).expect("fits");
    let first = Fragmenter::new(nz(1500), nz(4))
        .fragment(dgram)
        .expect("splits")
        .into_fragments()
        .remove(0);

    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let ttl = Duration::from_millis(10);
        let mut reassembler = Reassembler::new(FlowTableConfig::new(nz(8), ttl), pool.clone());
        let now = Instant::now();
        reassembler.accept(first, now).expect("well-formed");
        reassembler.collect_garbage(now + ttl * 2);
    });

    assert_eq!(
        counter_with_label(
            &snapshotter,
            ipfrag_metrics::FLOWS_RETIRED,
            Some(("fate", FlowState::Expired.as_str()))
        ),
        1
    );
}
