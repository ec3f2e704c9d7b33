//! Validated runtime configuration for the fragmentation pipeline.
//!
//! [`PipelineConfig`] is built either programmatically or from the parsed
//! [`Cli`]. Every bound is checked here so an invalid value is reported
//! before any pool, queue or worker exists.

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    time::Duration,
};

use thiserror::Error;

use crate::{
    cli::{Cli, LogLevel},
    flow::FlowTableConfig,
    fragment::IPV4_HEADER_LEN,
};

/// Upper bound for `--maxflows`.
pub const MAX_FLOW_NUM: u32 = u16::MAX as u32;
/// Lower bound for `--maxflows`.
pub const MIN_FLOW_NUM: u32 = 1;
/// Default flow table capacity.
pub const DEFAULT_FLOW_NUM: u32 = 0x1000;

/// Longest accepted flow TTL.
pub const MAX_FLOW_TTL: Duration = Duration::from_secs(3600);
/// Shortest accepted flow TTL.
pub const MIN_FLOW_TTL: Duration = Duration::from_millis(1);
/// Default flow TTL.
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(1);

/// Default and maximum MTU (Ethernet).
pub const DEFAULT_MTU: usize = 1500;

/// Fragments a single datagram may be split into or reassembled from.
pub const MAX_FRAGMENTS: usize = 4;

/// Slots per flow table bucket. Must be a power of two.
pub const BUCKET_ENTRIES: usize = 16;

/// Size of every packet buffer handed out by the pool.
pub const BUFFER_SIZE: usize = 2048;

/// Capacity of the producer to consumer queue.
pub const QUEUE_CAPACITY: usize = 4096;

/// Buffers released from the death row per consumer iteration.
pub const DRAIN_BATCH: usize = 32;

/// Length of the synthetic datagrams built by the producer.
pub const DEFAULT_PACKET_LEN: usize = 1510;

/// Errors raised while validating configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "invalid max flows {0}; must be between {min} and {max}",
        min = MIN_FLOW_NUM,
        max = MAX_FLOW_NUM
    )]
    MaxFlows(u32),
    #[error("invalid flow ttl {0:?}; must be between 1ms and 3600s")]
    FlowTtl(Duration),
    #[error("invalid mtu {0}; must be between 1 and {max}", max = DEFAULT_MTU)]
    Mtu(u32),
    #[error("invalid tx rate {0}; must be at least 1")]
    TxRate(u32),
    #[error("invalid display rate {0}; must be at least 1")]
    DisplayRate(u32),
    #[error("invalid packet count {0}; must be at least 1")]
    PacketCount(u64),
    #[error(
        "invalid packet length {0}; must be between {min} and {max}",
        min = IPV4_HEADER_LEN,
        max = BUFFER_SIZE
    )]
    PacketLen(u32),
}

/// Everything the producer and consumer need to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_flows: NonZeroUsize,
    pub flow_ttl: Duration,
    pub mtu: NonZeroUsize,
    pub tx_rate: NonZeroU32,
    pub display_rate: NonZeroU32,
    pub packet_count: NonZeroU64,
    pub packet_len: usize,
    /// Drop the terminal fragment of every datagram.
    pub error_mode: bool,
    pub dump: bool,
    pub stat: bool,
    pub gc: bool,
    pub log_level: LogLevel,
    pub max_fragments: NonZeroUsize,
    pub bucket_entries: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
    pub drain_batch: NonZeroUsize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_flows: nz(DEFAULT_FLOW_NUM as usize),
            flow_ttl: DEFAULT_FLOW_TTL,
            mtu: nz(DEFAULT_MTU),
            tx_rate: NonZeroU32::MIN,
            display_rate: NonZeroU32::MIN,
            packet_count: NonZeroU64::MIN,
            packet_len: DEFAULT_PACKET_LEN,
            error_mode: false,
            dump: false,
            stat: false,
            gc: false,
            log_level: LogLevel::Info,
            max_fragments: nz(MAX_FRAGMENTS),
            bucket_entries: nz(BUCKET_ENTRIES),
            queue_capacity: nz(QUEUE_CAPACITY),
            drain_batch: nz(DRAIN_BATCH),
        }
    }
}

impl PipelineConfig {
    /// Interval between producer ticks.
    #[must_use]
    pub fn tx_interval(&self) -> Duration { Duration::from_secs(1) / self.tx_rate.get() }

    /// Interval between throughput reports.
    #[must_use]
    pub fn display_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.display_rate.get()))
    }

    /// Pool size able to hold a full flow table, a full queue and slack for
    /// in-flight reassembly output.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.max_flows
            .get()
            .saturating_mul(self.max_fragments.get())
            .saturating_add(self.queue_capacity.get())
            .saturating_add(1024)
    }

    /// Flow table settings derived from this configuration.
    #[must_use]
    pub fn flow_table(&self) -> FlowTableConfig {
        FlowTableConfig {
            max_flows: self.max_flows,
            bucket_entries: self.bucket_entries,
            max_fragments: self.max_fragments,
            ttl: self.flow_ttl,
            death_row_capacity: self.drain_batch.saturating_mul(self.max_fragments),
        }
    }
}

impl TryFrom<&Cli> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        if !(MIN_FLOW_NUM..=MAX_FLOW_NUM).contains(&cli.max_flows) {
            return Err(ConfigError::MaxFlows(cli.max_flows));
        }
        if !(MIN_FLOW_TTL..=MAX_FLOW_TTL).contains(&cli.flow_ttl) {
            return Err(ConfigError::FlowTtl(cli.flow_ttl));
        }
        let mtu = usize::try_from(cli.mtu)
            .ok()
            .filter(|mtu| *mtu <= DEFAULT_MTU)
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::Mtu(cli.mtu))?;
        let tx_rate = NonZeroU32::new(cli.tx_pps).ok_or(ConfigError::TxRate(cli.tx_pps))?;
        let display_rate =
            NonZeroU32::new(cli.display_pps).ok_or(ConfigError::DisplayRate(cli.display_pps))?;
        let packet_count = NonZeroU64::new(cli.count).ok_or(ConfigError::PacketCount(cli.count))?;
        let packet_len = usize::try_from(cli.packet_len)
            .ok()
            .filter(|len| (IPV4_HEADER_LEN..=BUFFER_SIZE).contains(len))
            .ok_or(ConfigError::PacketLen(cli.packet_len))?;
        let max_flows = usize::try_from(cli.max_flows)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::MaxFlows(cli.max_flows))?;

        Ok(Self {
            max_flows,
            flow_ttl: cli.flow_ttl,
            mtu,
            tx_rate,
            display_rate,
            packet_count,
            packet_len,
            error_mode: cli.error,
            dump: cli.dump,
            stat: cli.stat,
            gc: cli.gc,
            log_level: cli.log_level,
            ..Self::default()
        })
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

const fn nz(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => NonZeroUsize::MIN,
    }
}
