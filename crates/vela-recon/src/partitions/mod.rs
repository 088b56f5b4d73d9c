//! Partition spaces and the subset algebra over them.
//!
//! A [`PartitionsDefinition`] describes an asset's logical key space: a
//! static enumeration, a time-window series (daily / hourly / custom cron),
//! a multi-dimensional product, or a dynamically registered set. A
//! [`PartitionSubset`] is a compact, set-like value scoped to one
//! definition, supporting union, membership, deterministic iteration, and a
//! serialized form bounded in size (range-compressed for time windows).

pub mod definition;
pub mod subset;
pub mod time_window;

pub use definition::{
    Cadence, DynamicPartitionsSource, NoDynamicPartitions, PartitionDimension, PartitionKeyRange,
    PartitionsDefinition, TimeWindowPartitionsDefinition,
};
pub use subset::PartitionSubset;
pub use time_window::TimeWindow;
