//! Producer / consumer harness driving the packet path.
//!
//! The producer and consumer each run a busy-poll loop on a dedicated
//! blocking thread, joined by a bounded SPSC queue. The consumer owns the
//! fragmenter, the reassembler and its flow table; the only state shared
//! between the two threads is the queue, the pool's lock-free free list and
//! the atomic [`PipelineCounters`].

pub mod consumer;
pub mod counters;
pub mod producer;
pub mod report;

use std::future::Future;

pub use consumer::{Consumer, ConsumerOutcome};
pub use counters::{CounterSnapshot, PipelineCounters};
pub use producer::Producer;
use tokio::{select, signal, task};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    clock::{MonotonicClock, Pacer},
    config::{BUFFER_SIZE, PipelineConfig},
    error::{PipelineError, ResourceError},
    flow::FlowTableStats,
    pool::PacketPool,
    queue,
};

/// Totals reported when the pipeline stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSummary {
    pub counters: CounterSnapshot,
    pub table: FlowTableStats,
    /// A shutdown signal arrived before the run completed.
    pub interrupted: bool,
    pub live_flows: usize,
    /// Pool buffers still out once both workers have exited.
    pub pool_in_use: usize,
}

/// Owns the resources of one run.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    pool: PacketPool,
    counters: PipelineCounters,
}

impl Pipeline {
    /// Allocate the packet pool.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Resource`] if the pool cannot be created.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let count = config.pool_capacity();
        let pool = PacketPool::new(count, BUFFER_SIZE)
            .map_err(|source| ResourceError::Pool { count, source })?;
        info!(
            buffers = count,
            buffer_size = BUFFER_SIZE,
            max_flows = config.max_flows.get(),
            ttl = ?config.flow_ttl,
            mtu = config.mtu.get(),
            "pipeline resources ready"
        );
        Ok(Self {
            config,
            pool,
            counters: PipelineCounters::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig { &self.config }

    #[must_use]
    pub fn pool(&self) -> &PacketPool { &self.pool }

    #[must_use]
    pub fn counters(&self) -> &PipelineCounters { &self.counters }

    /// Run until the configured count is processed or SIGINT / SIGTERM
    /// arrives.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Worker`] if a worker thread panics.
    pub async fn run(self) -> Result<PipelineSummary, PipelineError> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Run until the configured count is processed or `shutdown` resolves.
    ///
    /// Reaching the count stops the producer and drains every buffer back to
    /// the pool before returning. A shutdown cancels both workers at once
    /// with no drain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Worker`] if a worker thread panics.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<PipelineSummary, PipelineError>
    where
        S: Future<Output = ()> + Send,
    {
        let Self {
            config,
            pool,
            counters,
        } = self;
        let token = CancellationToken::new();
        let producer_token = token.child_token();
        let (tx, rx) = queue::bounded(config.queue_capacity);

        let producer = Producer::new(
            pool.clone(),
            tx,
            Pacer::new(config.tx_interval()),
            MonotonicClock,
            counters.clone(),
            config.packet_len,
            producer_token.clone(),
        );
        let consumer = Consumer::new(
            &config,
            rx,
            pool.clone(),
            MonotonicClock,
            counters.clone(),
            token.clone(),
            producer_token,
        );

        let finished = CancellationToken::new();
        let consumer_done = finished.clone();
        let producer_task = task::spawn_blocking(move || producer.run());
        let consumer_task = task::spawn_blocking(move || {
            let _done = consumer_done.drop_guard();
            consumer.run()
        });

        select! {
            () = shutdown => {
                info!("shutdown requested; stopping workers");
                token.cancel();
            }
            () = finished.cancelled() => {}
        }
        token.cancel();

        let outcome = consumer_task.await?;
        producer_task.await?;

        let summary = PipelineSummary {
            counters: counters.snapshot(),
            table: outcome.table,
            interrupted: outcome.interrupted,
            live_flows: outcome.live_flows,
            pool_in_use: pool.in_use(),
        };
        info!(
            processed = summary.counters.processed,
            reassembled = summary.counters.reassembled,
            enq_fail = summary.counters.enqueue_failures,
            interrupted = summary.interrupted,
            pool_in_use = summary.pool_in_use,
            "pipeline stopped"
        );
        Ok(summary)
    }
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                select! {
                    _ = signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(error) => {
                warn!(%error, "cannot install SIGTERM handler; waiting for Ctrl+C");
                let _ = signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
