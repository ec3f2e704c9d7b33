//! Flow tracking for in-progress reassemblies.
//!
//! A flow is the set of fragments sharing one [`FlowKey`](crate::fragment::FlowKey).
//! The [`FlowTable`] bounds how many flows are live at once, expires idle
//! ones, and hands retired records to a [`DeathRow`] so their buffers are
//! released in bounded batches.

pub mod config;
pub mod death_row;
mod lru;
pub mod record;
pub mod stats;
pub mod table;

pub use config::FlowTableConfig;
pub use death_row::DeathRow;
pub use record::{FlowRecord, FlowState, FragmentEntry};
pub(crate) use record::{Insertion, RejectKind};
pub use stats::FlowTableStats;
pub use table::{FlowHandle, FlowTable};

#[cfg(test)]
mod tests;
