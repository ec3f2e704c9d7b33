//! Command line interface for the `ipfrag` binary.
//!
//! The definition stays free of crate imports so the build script can
//! include it verbatim when rendering the man page. Range checks live in
//! [`crate::config`]; only syntax is handled here.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Command line arguments for the `ipfrag` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ipfrag",
    version,
    about = "Fragment synthetic IPv4 datagrams and reassemble them through a bounded flow table"
)]
pub struct Cli {
    /// Maximum number of flows tracked by the reassembly table.
    #[arg(long = "maxflows", default_value_t = 4096)]
    pub max_flows: u32,

    /// Maximum lifetime of an incomplete flow: `<n>`, `<n>ms` or `<n>s`.
    #[arg(long = "flowttl", default_value = "1000ms", value_parser = parse_flow_ttl)]
    pub flow_ttl: Duration,

    /// Largest fragment, header included, in bytes.
    #[arg(long, default_value_t = 1500)]
    pub mtu: u32,

    /// Datagrams generated per second by the producer.
    #[arg(long = "tx-pps", default_value_t = 1)]
    pub tx_pps: u32,

    /// Seconds between throughput reports.
    #[arg(long = "display-pps", default_value_t = 1)]
    pub display_pps: u32,

    /// Datagrams to process before draining and exiting.
    #[arg(long, default_value_t = 1)]
    pub count: u64,

    /// Length of each synthetic datagram, header included.
    #[arg(long = "packet-len", default_value_t = 1510)]
    pub packet_len: u32,

    /// Drop the last fragment of every datagram.
    #[arg(long)]
    pub error: bool,

    /// Log the LRU list with payload heads after every datagram.
    #[arg(long)]
    pub dump: bool,

    /// Include flow table statistics in periodic reports.
    #[arg(long)]
    pub stat: bool,

    /// Sweep expired flows on every consumer iteration.
    #[arg(long)]
    pub gc: bool,

    /// Log verbosity.
    #[arg(long = "log", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

/// Verbosity levels accepted by `--log`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse a flow TTL in milliseconds, accepting an `s` or `ms` suffix.
///
/// # Errors
///
/// Returns a message when the number is missing or the suffix is unknown.
pub fn parse_flow_ttl(raw: &str) -> Result<Duration, String> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid flow ttl \"{raw}\""))?;
    match suffix {
        "" | "ms" => Ok(Duration::from_millis(value)),
        "s" => value
            .checked_mul(1000)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("flow ttl \"{raw}\" overflows")),
        other => Err(format!("unknown flow ttl unit \"{other}\"")),
    }
}
