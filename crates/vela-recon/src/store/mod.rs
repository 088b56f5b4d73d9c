//! The read-only query surface the evaluator consumes.
//!
//! All data an evaluation needs is fetched up front by the harness and
//! handed in behind [`EventLogView`]; the evaluator core performs no I/O.
//! The harness is responsible for snapshot consistency (e.g. a fixed
//! storage-id upper bound) for the duration of one evaluation.

mod memory;

pub use memory::InMemoryEventLog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::ConditionKind;
use crate::partitions::DynamicPartitionsSource;
use vela_core::{AssetKey, AssetKeyPartitionKey};

/// Kind of a recorded asset event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The asset (partition) was computed and persisted.
    Materialization,
    /// An externally-produced asset was observed.
    Observation,
}

/// One event-log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogRecord {
    /// Monotonically increasing event-log position.
    pub storage_id: u64,
    /// The asset the event concerns.
    pub asset_key: AssetKey,
    /// The partition the event concerns, if partitioned.
    pub partition_key: Option<String>,
    /// Materialization or observation.
    pub kind: EventKind,
    /// Logical data version attached to the event, if any.
    pub data_version: Option<String>,
    /// Wall-clock time the event was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Read-only view over the event log and dynamic-partitions registry.
///
/// One evaluation queries a single consistent snapshot; implementations
/// must answer every method from that snapshot without blocking.
pub trait EventLogView: DynamicPartitionsSource {
    /// Returns every record with `storage_id` greater than `after`, in
    /// storage-id order. `None` means "from the beginning".
    fn records_since(&self, after: Option<u64>) -> Vec<EventLogRecord>;

    /// Returns the latest record for `asset`, optionally restricted to one
    /// partition (`None` matches any partition) and/or one event kind.
    fn latest_record(
        &self,
        asset: &AssetKey,
        partition: Option<&str>,
        kind: Option<EventKind>,
    ) -> Option<EventLogRecord>;

    /// The highest storage id in the snapshot, if any events exist.
    fn max_storage_id(&self) -> Option<u64>;

    /// Externally forced condition for a target, used for testing and for
    /// pluggable condition evaluation. `None` leaves the decision to the
    /// evaluator's own rules.
    fn condition_override(&self, _target: &AssetKeyPartitionKey) -> Option<ConditionKind> {
        None
    }

    /// Upcast helper: the view as a dynamic-partitions source. Implementers
    /// return `self`.
    fn as_dynamic_source(&self) -> &dyn DynamicPartitionsSource;
}
