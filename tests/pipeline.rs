//! Full producer / consumer runs on real threads.

use std::{
    future,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    time::Duration,
};

use ipfrag::{Pipeline, PipelineConfig};
use rstest::{fixture, rstest};

fn nz(value: usize) -> NonZeroUsize { NonZeroUsize::new(value).expect("non-zero") }

#[fixture]
fn config() -> PipelineConfig {
    PipelineConfig {
        max_flows: nz(64),
        flow_ttl: Duration::from_millis(20),
        tx_rate: NonZeroU32::new(10_000).expect("non-zero"),
        display_rate: NonZeroU32::new(100).expect("non-zero"),
        packet_count: NonZeroU64::new(25).expect("non-zero"),
        queue_capacity: nz(64),
        gc: true,
        stat: true,
        ..PipelineConfig::default()
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn run_reassembles_every_datagram(config: PipelineConfig) {
    let summary = Pipeline::new(config)
        .expect("pool allocates")
        .run_with_shutdown(future::pending())
        .await
        .expect("workers join");

    assert!(!summary.interrupted);
    assert_eq!(summary.counters.processed, 25);
    assert_eq!(summary.counters.reassembled, 25);
    assert_eq!(summary.table.completed, 25);
    assert_eq!(summary.live_flows, 0);
    assert_eq!(summary.pool_in_use, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn error_mode_expires_every_flow(config: PipelineConfig) {
    let config = PipelineConfig {
        error_mode: true,
        ..config
    };
    let summary = Pipeline::new(config)
        .expect("pool allocates")
        .run_with_shutdown(future::pending())
        .await
        .expect("workers join");

    assert!(!summary.interrupted);
    assert_eq!(summary.counters.processed, 25);
    assert_eq!(summary.counters.reassembled, 0);
    assert_eq!(summary.table.completed, 0);
    assert_eq!(summary.pool_in_use, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_interrupts_a_long_run(config: PipelineConfig) {
    let config = PipelineConfig {
        tx_rate: NonZeroU32::MIN,
        packet_count: NonZeroU64::new(1_000_000).expect("non-zero"),
        ..config
    };
    let summary = Pipeline::new(config)
        .expect("pool allocates")
        .run_with_shutdown(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .expect("workers join");

    assert!(summary.interrupted);
    assert!(summary.counters.processed < 1_000_000);
}
