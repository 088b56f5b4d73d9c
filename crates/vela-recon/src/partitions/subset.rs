//! Partition subsets: compact sets of partition keys scoped to one
//! definition.
//!
//! Time-window subsets store canonical half-open ranges and re-merge on
//! every union so the serialized form stays bounded; all other variants
//! store an explicit sorted key set. A subset never holds keys outside its
//! definition's current key space: construction validates membership, and
//! the only unchecked path ([`PartitionsDefinition::subset_with_known_keys`])
//! is reserved for keys the engine already read from that key space.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partitions::definition::{DynamicPartitionsSource, PartitionsDefinition};
use crate::partitions::time_window::{merge_windows, TimeWindow};

/// Internal representation of a subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum SubsetRepr {
    /// Canonical merged half-open window runs.
    TimeWindows(Vec<TimeWindow>),
    /// Explicit deduplicated keys.
    Keys(BTreeSet<String>),
}

/// An immutable set of partition keys scoped to one partitions definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSubset {
    /// Family fingerprint of the owning definition.
    fingerprint: String,
    repr: SubsetRepr,
}

/// Serialized form: either window ranges or an explicit key list.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SubsetWire {
    Ranges(Vec<(DateTime<Utc>, DateTime<Utc>)>),
    Keys(Vec<String>),
}

impl PartitionSubset {
    /// Returns the family fingerprint of the definition this subset is
    /// scoped to.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns true if the subset holds no partitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.repr {
            SubsetRepr::TimeWindows(windows) => windows.is_empty(),
            SubsetRepr::Keys(keys) => keys.is_empty(),
        }
    }

    /// Unions two subsets over the same definition family.
    ///
    /// Adjacent and overlapping window runs are merged so the
    /// representation stays canonical.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatiblePartitions`] if the fingerprints differ.
    pub fn union(&self, other: &Self) -> Result<Self> {
        if self.fingerprint != other.fingerprint {
            return Err(Error::IncompatiblePartitions {
                left: self.fingerprint.clone(),
                right: other.fingerprint.clone(),
            });
        }
        let repr = match (&self.repr, &other.repr) {
            (SubsetRepr::TimeWindows(a), SubsetRepr::TimeWindows(b)) => {
                let mut windows = a.clone();
                windows.extend(b.iter().copied());
                SubsetRepr::TimeWindows(merge_windows(windows))
            }
            (SubsetRepr::Keys(a), SubsetRepr::Keys(b)) => {
                SubsetRepr::Keys(a.union(b).cloned().collect())
            }
            // Same fingerprint implies the same representation shape.
            _ => {
                return Err(Error::IncompatiblePartitions {
                    left: self.fingerprint.clone(),
                    right: other.fingerprint.clone(),
                })
            }
        };
        Ok(Self {
            fingerprint: self.fingerprint.clone(),
            repr,
        })
    }

    /// Returns true if `partition_key` is a member, interpreting window
    /// membership through `def`.
    ///
    /// An unparseable key is simply not a member.
    #[must_use]
    pub fn contains(&self, def: &PartitionsDefinition, partition_key: &str) -> bool {
        match (&self.repr, def) {
            (SubsetRepr::Keys(keys), _) => keys.contains(partition_key),
            (SubsetRepr::TimeWindows(windows), PartitionsDefinition::TimeWindow(tw)) => tw
                .window_for_key(partition_key)
                .map(|w| windows.iter().any(|run| run.contains(w.start)))
                .unwrap_or(false),
            (SubsetRepr::TimeWindows(_), _) => false,
        }
    }

    /// Returns the number of partitions in the subset.
    ///
    /// # Errors
    ///
    /// Returns an error if a window run cannot be enumerated against `def`
    /// (invalid cron expression or timezone).
    pub fn len(&self, def: &PartitionsDefinition) -> Result<usize> {
        Ok(self.partition_keys(def)?.len())
    }

    /// Returns the member keys in the definition's canonical order.
    ///
    /// # Errors
    ///
    /// Returns an error if a window run cannot be enumerated against `def`.
    pub fn partition_keys(&self, def: &PartitionsDefinition) -> Result<Vec<String>> {
        match (&self.repr, def) {
            (SubsetRepr::Keys(keys), _) => Ok(keys.iter().cloned().collect()),
            (SubsetRepr::TimeWindows(windows), PartitionsDefinition::TimeWindow(tw)) => {
                let mut keys = Vec::new();
                for run in windows {
                    // Enumerate complete windows inside the run.
                    for window in tw.windows_through(run.end)? {
                        if window.start >= run.start {
                            keys.push(tw.key_for_window(&window)?);
                        }
                    }
                }
                Ok(keys)
            }
            (SubsetRepr::TimeWindows(_), _) => Err(Error::serialization(
                "time-window subset bound to a non-time-window definition",
            )),
        }
    }

    /// Serializes the subset to its compact JSON form.
    ///
    /// Time-window subsets serialize as a list of `[start, end)` ISO pairs;
    /// all other subsets as a sorted key list.
    #[must_use]
    pub fn serialize(&self) -> String {
        let wire = match &self.repr {
            SubsetRepr::TimeWindows(windows) => {
                SubsetWire::Ranges(windows.iter().map(|w| (w.start, w.end)).collect())
            }
            SubsetRepr::Keys(keys) => SubsetWire::Keys(keys.iter().cloned().collect()),
        };
        // A subset is plain data; serializing it cannot fail.
        serde_json::to_string(&wire).unwrap_or_else(|_| "[]".to_string())
    }
}

impl PartitionsDefinition {
    /// Returns the empty subset scoped to this definition.
    #[must_use]
    pub fn empty_subset(&self) -> PartitionSubset {
        let repr = match self {
            Self::TimeWindow(_) => SubsetRepr::TimeWindows(Vec::new()),
            _ => SubsetRepr::Keys(BTreeSet::new()),
        };
        PartitionSubset {
            fingerprint: self.family_fingerprint(),
            repr,
        }
    }

    /// Builds a subset from keys, validating every key against the current
    /// key space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionKey`] for any key outside the key
    /// space as of `now`.
    pub fn subset_with_partition_keys<I, S>(
        &self,
        keys: I,
        now: DateTime<Utc>,
        dynamic: &dyn DynamicPartitionsSource,
    ) -> Result<PartitionSubset>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let valid: BTreeSet<String> = self.partition_keys(now, dynamic)?.into_iter().collect();
        let mut members: BTreeSet<String> = BTreeSet::new();
        for key in keys {
            let key = key.into();
            if !valid.contains(&key) {
                return Err(Error::InvalidPartitionKey {
                    partition_key: key,
                    definition: self.describe(),
                });
            }
            members.insert(key);
        }
        Ok(self.subset_with_known_keys(members))
    }

    /// Builds a subset from keys already known to belong to this
    /// definition's key space (e.g. keys the engine just enumerated from
    /// it). Unparseable keys for time-window definitions are silently
    /// dropped rather than surfaced; validated construction goes through
    /// [`Self::subset_with_partition_keys`].
    #[must_use]
    pub fn subset_with_known_keys<I, S>(&self, keys: I) -> PartitionSubset
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fingerprint = self.family_fingerprint();
        match self {
            Self::TimeWindow(tw) => {
                let windows: Vec<TimeWindow> = keys
                    .into_iter()
                    .filter_map(|key| tw.window_for_key(&key.into()).ok())
                    .collect();
                PartitionSubset {
                    fingerprint,
                    repr: SubsetRepr::TimeWindows(merge_windows(windows)),
                }
            }
            _ => PartitionSubset {
                fingerprint,
                repr: SubsetRepr::Keys(keys.into_iter().map(Into::into).collect()),
            },
        }
    }

    /// Deserializes a subset previously produced by
    /// [`PartitionSubset::serialize`].
    ///
    /// Both wire forms are accepted for time-window definitions: the range
    /// list, and (for payloads written before range compression) an
    /// explicit key list.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload parses as neither form, or if a
    /// range list is presented for a non-time-window definition.
    pub fn deserialize_subset(&self, payload: &str) -> Result<PartitionSubset> {
        let wire: SubsetWire = serde_json::from_str(payload)
            .map_err(|e| Error::serialization(format!("partition subset payload: {e}")))?;
        // An empty list is ambiguous between the two wire forms; it decodes
        // to the empty subset for every definition.
        if matches!(&wire, SubsetWire::Ranges(r) if r.is_empty())
            || matches!(&wire, SubsetWire::Keys(k) if k.is_empty())
        {
            return Ok(self.empty_subset());
        }
        match (wire, self) {
            (SubsetWire::Ranges(ranges), Self::TimeWindow(_)) => {
                let windows: Vec<TimeWindow> = ranges
                    .into_iter()
                    .filter_map(|(start, end)| TimeWindow::new(start, end))
                    .collect();
                Ok(PartitionSubset {
                    fingerprint: self.family_fingerprint(),
                    repr: SubsetRepr::TimeWindows(merge_windows(windows)),
                })
            }
            (SubsetWire::Keys(keys), _) => Ok(self.subset_with_known_keys(keys)),
            (SubsetWire::Ranges(_), _) => Err(Error::serialization(
                "range-form subset payload for a non-time-window definition",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitions::definition::NoDynamicPartitions;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn daily() -> PartitionsDefinition {
        PartitionsDefinition::daily(utc(2026, 1, 1))
    }

    #[test]
    fn empty_subset_is_empty() {
        let def = daily();
        let subset = def.empty_subset();
        assert!(subset.is_empty());
        assert_eq!(subset.len(&def).unwrap(), 0);
    }

    #[test]
    fn static_subset_deduplicates_and_sorts() {
        let def = PartitionsDefinition::static_keys(["a", "b", "c"]);
        let subset = def
            .subset_with_partition_keys(["c", "a", "c"], utc(2026, 1, 1), &NoDynamicPartitions)
            .unwrap();
        assert_eq!(subset.len(&def).unwrap(), 2);
        assert_eq!(subset.partition_keys(&def).unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn subset_rejects_key_outside_key_space() {
        let def = PartitionsDefinition::static_keys(["a", "b"]);
        let result =
            def.subset_with_partition_keys(["z"], utc(2026, 1, 1), &NoDynamicPartitions);
        assert!(matches!(result, Err(Error::InvalidPartitionKey { .. })));
    }

    #[test]
    fn time_window_subset_merges_adjacent_keys_into_one_run() {
        let def = daily();
        let subset = def
            .subset_with_partition_keys(
                ["2026-01-01", "2026-01-02", "2026-01-03"],
                utc(2026, 1, 10),
                &NoDynamicPartitions,
            )
            .unwrap();
        // One merged run serializes to a single range pair.
        let serialized = subset.serialize();
        let ranges: Vec<(DateTime<Utc>, DateTime<Utc>)> =
            serde_json::from_str(&serialized).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].0, utc(2026, 1, 1));
        assert_eq!(ranges[0].1, utc(2026, 1, 4));
        assert_eq!(subset.len(&def).unwrap(), 3);
    }

    #[test]
    fn time_window_subset_membership() {
        let def = daily();
        let subset = def
            .subset_with_partition_keys(
                ["2026-01-01", "2026-01-03"],
                utc(2026, 1, 10),
                &NoDynamicPartitions,
            )
            .unwrap();
        assert!(subset.contains(&def, "2026-01-01"));
        assert!(!subset.contains(&def, "2026-01-02"));
        assert!(subset.contains(&def, "2026-01-03"));
        assert!(!subset.contains(&def, "not a key"));
    }

    #[test]
    fn union_merges_and_stays_canonical() {
        let def = daily();
        let a = def
            .subset_with_partition_keys(["2026-01-01"], utc(2026, 1, 10), &NoDynamicPartitions)
            .unwrap();
        let b = def
            .subset_with_partition_keys(["2026-01-02"], utc(2026, 1, 10), &NoDynamicPartitions)
            .unwrap();
        let ab = a.union(&b).unwrap();
        let ba = b.union(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(
            ab.partition_keys(&def).unwrap(),
            vec!["2026-01-01", "2026-01-02"]
        );
    }

    #[test]
    fn union_of_incompatible_families_fails() {
        let daily_def = daily();
        let hourly_def = PartitionsDefinition::hourly(utc(2026, 1, 1));
        let a = daily_def.empty_subset();
        let b = hourly_def.empty_subset();
        assert!(matches!(
            a.union(&b),
            Err(Error::IncompatiblePartitions { .. })
        ));
    }

    #[test]
    fn serialized_static_subset_is_a_sorted_key_list() {
        let def = PartitionsDefinition::static_keys(["b", "a"]);
        let subset = def
            .subset_with_partition_keys(["b", "a"], utc(2026, 1, 1), &NoDynamicPartitions)
            .unwrap();
        assert_eq!(subset.serialize(), r#"["a","b"]"#);
    }

    #[test]
    fn round_trip_static_subset() {
        let def = PartitionsDefinition::static_keys(["a", "b", "c"]);
        let subset = def
            .subset_with_partition_keys(["a", "c"], utc(2026, 1, 1), &NoDynamicPartitions)
            .unwrap();
        let back = def.deserialize_subset(&subset.serialize()).unwrap();
        assert_eq!(back, subset);
    }

    #[test]
    fn round_trip_time_window_subset() {
        let def = daily();
        let subset = def
            .subset_with_partition_keys(
                ["2026-01-01", "2026-01-02", "2026-01-05"],
                utc(2026, 1, 10),
                &NoDynamicPartitions,
            )
            .unwrap();
        let back = def.deserialize_subset(&subset.serialize()).unwrap();
        assert_eq!(back, subset);
    }

    #[test]
    fn time_window_definition_accepts_legacy_key_list_payload() {
        let def = daily();
        let back = def
            .deserialize_subset(r#"["2026-01-01","2026-01-02"]"#)
            .unwrap();
        assert!(back.contains(&def, "2026-01-01"));
        assert!(back.contains(&def, "2026-01-02"));
        assert!(!back.contains(&def, "2026-01-03"));
    }

    #[test]
    fn range_payload_for_static_definition_is_rejected() {
        let def = PartitionsDefinition::static_keys(["a"]);
        let payload = r#"[["2026-01-01T00:00:00Z","2026-01-02T00:00:00Z"]]"#;
        assert!(def.deserialize_subset(payload).is_err());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let def = daily();
        assert!(def.deserialize_subset("not json").is_err());
    }
}
