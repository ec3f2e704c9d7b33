//! Metric helpers for `ipfrag`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing, so call sites need no gating.

use crate::flow::FlowState;

/// Name of the counter tracking fragments fed to the reassembler.
pub const FRAGMENTS_PROCESSED: &str = "ipfrag_fragments_processed_total";
/// Name of the counter tracking datagrams rebuilt from fragments.
pub const DATAGRAMS_REASSEMBLED: &str = "ipfrag_datagrams_reassembled_total";
/// Name of the counter tracking flows leaving the table, labelled by fate.
pub const FLOWS_RETIRED: &str = "ipfrag_flows_retired_total";
/// Name of the counter tracking datagrams dropped on a full queue.
pub const ENQUEUE_FAILURES: &str = "ipfrag_enqueue_failures_total";
/// Name of the gauge tracking pool buffers in use.
pub const POOL_IN_USE: &str = "ipfrag_pool_buffers_in_use";

/// Record a fragment handed to the reassembler.
pub fn inc_fragments() {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAGMENTS_PROCESSED).increment(1);
}

/// Record a completed reassembly.
pub fn inc_reassembled() {
    #[cfg(feature = "metrics")]
    metrics::counter!(DATAGRAMS_REASSEMBLED).increment(1);
}

/// Record a flow leaving the table.
pub fn inc_flows_retired(fate: FlowState) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FLOWS_RETIRED, "fate" => fate.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = fate;
}

/// Record a datagram dropped because the queue was full.
pub fn inc_enqueue_failures() {
    #[cfg(feature = "metrics")]
    metrics::counter!(ENQUEUE_FAILURES).increment(1);
}

/// Publish the number of pool buffers currently held.
pub fn set_pool_in_use(in_use: usize) {
    #[cfg(feature = "metrics")]
    #[expect(clippy::cast_precision_loss, reason = "gauge values are approximate")]
    metrics::gauge!(POOL_IN_USE).set(in_use as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = in_use;
}
