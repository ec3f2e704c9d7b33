//! Public API for the `ipfrag` library.
//!
//! This crate fragments IPv4 datagrams to an MTU and reassembles them
//! through a bounded, LRU-managed flow table with TTL expiry. A
//! producer / consumer harness drives synthetic traffic through the path.

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod flow;
pub mod fragment;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod queue;

pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, ResourceError};
pub use flow::{DeathRow, FlowRecord, FlowState, FlowTable, FlowTableConfig, FlowTableStats};
pub use fragment::{
    Datagram,
    FlowKey,
    Fragment,
    FragmentBatch,
    FragmentationError,
    Fragmenter,
    HeaderError,
    Ipv4Header,
    Reassembler,
    ReassemblyError,
    Reassembly,
};
pub use pipeline::{Pipeline, PipelineSummary};
pub use pool::{PacketBuf, PacketPool, PoolError};
