//! In-memory event log for tests and single-process harnesses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::evaluation::ConditionKind;
use crate::partitions::DynamicPartitionsSource;
use crate::store::{EventKind, EventLogRecord, EventLogView};
use vela_core::{AssetKey, AssetKeyPartitionKey};

/// An [`EventLogView`] backed by plain vectors and maps.
///
/// Records are appended through the `record_*` methods, which assign
/// storage ids in insertion order. The view methods then answer from the
/// accumulated snapshot.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: Vec<EventLogRecord>,
    next_storage_id: u64,
    dynamic_partitions: BTreeMap<String, Vec<String>>,
    condition_overrides: BTreeMap<AssetKeyPartitionKey, ConditionKind>,
}

impl InMemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a materialization record and returns its storage id.
    pub fn record_materialization(
        &mut self,
        asset_key: AssetKey,
        partition_key: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        self.append(asset_key, partition_key, EventKind::Materialization, None, timestamp)
    }

    /// Appends an observation record with a data version and returns its
    /// storage id.
    pub fn record_observation(
        &mut self,
        asset_key: AssetKey,
        data_version: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        self.append(asset_key, None, EventKind::Observation, data_version, timestamp)
    }

    /// Registers dynamic partition keys under `name`.
    pub fn add_dynamic_partitions(
        &mut self,
        name: impl Into<String>,
        keys: impl IntoIterator<Item = String>,
    ) {
        self.dynamic_partitions
            .entry(name.into())
            .or_default()
            .extend(keys);
    }

    /// Forces a condition outcome for one target.
    pub fn force_condition(&mut self, target: AssetKeyPartitionKey, condition: ConditionKind) {
        self.condition_overrides.insert(target, condition);
    }

    fn append(
        &mut self,
        asset_key: AssetKey,
        partition_key: Option<String>,
        kind: EventKind,
        data_version: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        self.next_storage_id += 1;
        let storage_id = self.next_storage_id;
        self.records.push(EventLogRecord {
            storage_id,
            asset_key,
            partition_key,
            kind,
            data_version,
            timestamp,
        });
        storage_id
    }
}

impl DynamicPartitionsSource for InMemoryEventLog {
    fn dynamic_partition_keys(&self, name: &str) -> Vec<String> {
        self.dynamic_partitions.get(name).cloned().unwrap_or_default()
    }
}

impl EventLogView for InMemoryEventLog {
    fn records_since(&self, after: Option<u64>) -> Vec<EventLogRecord> {
        let floor = after.unwrap_or(0);
        self.records
            .iter()
            .filter(|r| r.storage_id > floor)
            .cloned()
            .collect()
    }

    fn latest_record(
        &self,
        asset: &AssetKey,
        partition: Option<&str>,
        kind: Option<EventKind>,
    ) -> Option<EventLogRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| {
                r.asset_key == *asset
                    && (partition.is_none() || r.partition_key.as_deref() == partition)
                    && kind.map_or(true, |k| r.kind == k)
            })
            .cloned()
    }

    fn max_storage_id(&self) -> Option<u64> {
        self.records.last().map(|r| r.storage_id)
    }

    fn condition_override(&self, target: &AssetKeyPartitionKey) -> Option<ConditionKind> {
        self.condition_overrides.get(target).copied()
    }

    fn as_dynamic_source(&self) -> &dyn DynamicPartitionsSource {
        self
    }
}
