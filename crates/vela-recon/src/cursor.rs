//! The persisted reconciliation cursor.
//!
//! The cursor is the state carried between evaluations: the event-log
//! position already consumed, and which root targets have already been
//! materialized or requested. Each evaluation consumes the previous cursor
//! and emits a new one atomically with the run requests it authorizes; the
//! new cursor reflects every partition just requested so the next
//! evaluation cannot re-request it.
//!
//! ## Wire format
//!
//! The serialized form is a JSON array whose first element is a schema
//! version tag:
//!
//! - version 3 (current): `[3, latest_storage_id, [root_keys],
//!   {asset_key: serialized_subset}, {asset_key: observe_timestamp},
//!   {asset_key: freshness_request_timestamp}]`
//! - version 2: the same without the two timestamp maps
//! - legacy (the only shape-sniffed form): a bare 3-tuple
//!   `[latest_storage_id, [root_keys], {asset_key: serialized_subset}]`,
//!   distinguished by its length
//!
//! New top-level fields are added by incrementing the version; the decoder
//! accepts all prior versions and only fails when no known schema matches.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::AssetGraph;
use crate::partitions::{PartitionSubset, PartitionsDefinition};
use vela_core::{AssetKey, AssetKeyPartitionKey};

/// Current wire-format version.
const CURRENT_VERSION: u64 = 3;

/// State carried between evaluations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationCursor {
    /// Highest event-log position already consumed.
    pub latest_storage_id: Option<u64>,
    /// Unpartitioned root assets already materialized or requested.
    pub handled_root_asset_keys: BTreeSet<AssetKey>,
    /// Per-asset partitions already materialized or requested, for
    /// partitioned root assets.
    pub handled_root_partitions_by_asset_key: BTreeMap<AssetKey, PartitionSubset>,
    /// When each observable source was last asked for an observation.
    pub last_observe_request_timestamp_by_asset_key: BTreeMap<AssetKey, DateTime<Utc>>,
    /// When each asset was last requested on freshness grounds. Guards
    /// against re-requesting a freshness-driven materialization every
    /// evaluation while the run is still in flight.
    pub last_freshness_request_timestamp_by_asset_key: BTreeMap<AssetKey, DateTime<Utc>>,
}

impl ReconciliationCursor {
    /// The empty cursor used for a first evaluation.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if a root target was already materialized or requested.
    ///
    /// For partitioned targets the owning definition is needed to interpret
    /// window membership; without one the target counts as unhandled.
    #[must_use]
    pub fn was_root_handled(
        &self,
        target: &AssetKeyPartitionKey,
        def: Option<&PartitionsDefinition>,
    ) -> bool {
        match (&target.partition_key, def) {
            (None, _) => self.handled_root_asset_keys.contains(&target.asset_key),
            (Some(partition), Some(def)) => self
                .handled_root_partitions_by_asset_key
                .get(&target.asset_key)
                .is_some_and(|subset| subset.contains(def, partition)),
            (Some(_), None) => false,
        }
    }

    /// Produces the successor cursor for one completed evaluation.
    ///
    /// `latest_storage_id` never regresses; newly handled partitions fold
    /// into the existing subsets by union.
    ///
    /// # Errors
    ///
    /// Returns an error if a folded subset belongs to a different
    /// definition family than the stored one.
    pub fn advanced(
        &self,
        latest_storage_id: Option<u64>,
        newly_handled_roots: impl IntoIterator<Item = AssetKey>,
        newly_handled_partitions: impl IntoIterator<Item = (AssetKey, PartitionSubset)>,
        observe_requests: impl IntoIterator<Item = (AssetKey, DateTime<Utc>)>,
        freshness_requests: impl IntoIterator<Item = (AssetKey, DateTime<Utc>)>,
    ) -> Result<Self> {
        let mut next = self.clone();
        next.latest_storage_id = match (self.latest_storage_id, latest_storage_id) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => new.or(old),
        };
        next.handled_root_asset_keys.extend(newly_handled_roots);
        for (key, subset) in newly_handled_partitions {
            let folded = match next.handled_root_partitions_by_asset_key.get(&key) {
                Some(existing) => existing.union(&subset)?,
                None => subset,
            };
            next.handled_root_partitions_by_asset_key.insert(key, folded);
        }
        for (key, timestamp) in observe_requests {
            next.last_observe_request_timestamp_by_asset_key
                .insert(key, timestamp);
        }
        for (key, timestamp) in freshness_requests {
            next.last_freshness_request_timestamp_by_asset_key
                .insert(key, timestamp);
        }
        Ok(next)
    }

    /// Serializes the cursor at the newest schema version.
    #[must_use]
    pub fn serialized(&self) -> String {
        let root_keys: Vec<String> = self
            .handled_root_asset_keys
            .iter()
            .map(AssetKey::to_user_string)
            .collect();
        let subsets: BTreeMap<String, String> = self
            .handled_root_partitions_by_asset_key
            .iter()
            .map(|(key, subset)| (key.to_user_string(), subset.serialize()))
            .collect();
        let observe: BTreeMap<String, String> = self
            .last_observe_request_timestamp_by_asset_key
            .iter()
            .map(|(key, ts)| (key.to_user_string(), ts.to_rfc3339()))
            .collect();
        let freshness: BTreeMap<String, String> = self
            .last_freshness_request_timestamp_by_asset_key
            .iter()
            .map(|(key, ts)| (key.to_user_string(), ts.to_rfc3339()))
            .collect();

        let payload = json!([
            CURRENT_VERSION,
            self.latest_storage_id,
            root_keys,
            subsets,
            observe,
            freshness,
        ]);
        payload.to_string()
    }

    /// Decodes a persisted cursor payload.
    ///
    /// Subset entries are bound to the graph's current partitions
    /// definitions. Entries for assets no longer in the graph, no longer
    /// partitioned, or whose payload no longer decodes against the current
    /// definition are dropped with a warning rather than failing the
    /// decode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorDecode`] if the payload matches no known
    /// schema version.
    pub fn from_serialized(payload: &str, graph: &AssetGraph) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| Error::cursor_decode(format!("payload is not JSON: {e}")))?;
        let Value::Array(elements) = value else {
            return Err(Error::cursor_decode("payload is not a JSON array"));
        };

        // The documented legacy form is a bare 3-tuple; every versioned
        // form is longer and starts with its version tag.
        if elements.len() == 3 {
            return Self::decode_fields(&elements[0], &elements[1], &elements[2], None, None, graph);
        }

        let version = elements
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::cursor_decode("missing schema version tag"))?;
        match (version, elements.len()) {
            (2, 4) => {
                Self::decode_fields(&elements[1], &elements[2], &elements[3], None, None, graph)
            }
            (3, 6) => Self::decode_fields(
                &elements[1],
                &elements[2],
                &elements[3],
                Some(&elements[4]),
                Some(&elements[5]),
                graph,
            ),
            _ => Err(Error::cursor_decode(format!(
                "unsupported cursor schema version {version} ({} elements)",
                elements.len()
            ))),
        }
    }

    fn decode_fields(
        storage_id: &Value,
        root_keys: &Value,
        subsets: &Value,
        observe: Option<&Value>,
        freshness: Option<&Value>,
        graph: &AssetGraph,
    ) -> Result<Self> {
        let latest_storage_id = match storage_id {
            Value::Null => None,
            Value::Number(n) => Some(
                n.as_u64()
                    .ok_or_else(|| Error::cursor_decode("storage id is not an unsigned integer"))?,
            ),
            _ => return Err(Error::cursor_decode("storage id is not an integer or null")),
        };

        let Value::Array(key_values) = root_keys else {
            return Err(Error::cursor_decode("root keys field is not an array"));
        };
        let mut handled_root_asset_keys = BTreeSet::new();
        for value in key_values {
            let Some(s) = value.as_str() else {
                return Err(Error::cursor_decode("root key entry is not a string"));
            };
            handled_root_asset_keys.insert(AssetKey::from_user_string(s)?);
        }

        let Value::Object(subset_map) = subsets else {
            return Err(Error::cursor_decode("subsets field is not an object"));
        };
        let mut handled_root_partitions_by_asset_key = BTreeMap::new();
        for (key_string, subset_value) in subset_map {
            let Some(subset_payload) = subset_value.as_str() else {
                return Err(Error::cursor_decode("subset entry is not a string"));
            };
            let asset_key = AssetKey::from_user_string(key_string)?;
            let Some(def) = graph
                .get(&asset_key)
                .and_then(|node| node.spec().partitions_def.as_ref())
            else {
                warn!(asset = %asset_key, "dropping cursor subset for unknown or unpartitioned asset");
                continue;
            };
            match def.deserialize_subset(subset_payload) {
                Ok(subset) => {
                    handled_root_partitions_by_asset_key.insert(asset_key, subset);
                }
                Err(error) => {
                    warn!(asset = %asset_key, %error, "dropping undecodable cursor subset");
                }
            }
        }

        let last_observe_request_timestamp_by_asset_key = match observe {
            Some(value) => Self::decode_timestamp_map(value)?,
            None => BTreeMap::new(),
        };
        let last_freshness_request_timestamp_by_asset_key = match freshness {
            Some(value) => Self::decode_timestamp_map(value)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            latest_storage_id,
            handled_root_asset_keys,
            handled_root_partitions_by_asset_key,
            last_observe_request_timestamp_by_asset_key,
            last_freshness_request_timestamp_by_asset_key,
        })
    }

    fn decode_timestamp_map(value: &Value) -> Result<BTreeMap<AssetKey, DateTime<Utc>>> {
        let Value::Object(map) = value else {
            return Err(Error::cursor_decode("timestamp field is not an object"));
        };
        let mut decoded = BTreeMap::new();
        for (key_string, ts_value) in map {
            let Some(ts_string) = ts_value.as_str() else {
                return Err(Error::cursor_decode("timestamp entry is not a string"));
            };
            let asset_key = AssetKey::from_user_string(key_string)?;
            let timestamp = DateTime::parse_from_rfc3339(ts_string)
                .map_err(|e| Error::cursor_decode(format!("timestamp entry: {e}")))?
                .with_timezone(&Utc);
            decoded.insert(asset_key, timestamp);
        }
        Ok(decoded)
    }
}
