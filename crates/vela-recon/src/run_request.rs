//! Run requests: grouped materialization (or observation) instructions.
//!
//! One request carries every asset that can be materialized together in a
//! single run. Assets with different partition keys, or partitions
//! definitions from different families, are never combined.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use vela_core::AssetKey;

/// Well-known tag keys attached to run requests.
pub mod tags {
    /// Marks a request as produced by the reconciliation evaluator.
    pub const AUTO_MATERIALIZE: &str = "vela/auto_materialize";
    /// The partition key the request targets.
    pub const PARTITION: &str = "vela/partition";
    /// Marks a source-observation request.
    pub const OBSERVATION: &str = "vela/observation";
}

/// A batch instruction to materialize (or observe) a set of assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// The assets to run together, sorted by key.
    pub asset_selection: Vec<AssetKey>,
    /// The partition key all selected assets share, if partitioned.
    pub partition_key: Option<String>,
    /// Request tags, for the run launcher and reporting surfaces.
    pub tags: BTreeMap<String, String>,
}

impl RunRequest {
    /// Creates a materialization request for assets sharing one partition
    /// key (or all unpartitioned).
    #[must_use]
    pub fn materialization(
        mut asset_selection: Vec<AssetKey>,
        partition_key: Option<String>,
    ) -> Self {
        asset_selection.sort();
        asset_selection.dedup();
        let mut request_tags = BTreeMap::new();
        request_tags.insert(tags::AUTO_MATERIALIZE.to_string(), "true".to_string());
        if let Some(partition) = &partition_key {
            request_tags.insert(tags::PARTITION.to_string(), partition.clone());
        }
        Self {
            asset_selection,
            partition_key,
            tags: request_tags,
        }
    }

    /// Creates an observation request for a group of observable sources.
    #[must_use]
    pub fn observation(mut asset_selection: Vec<AssetKey>) -> Self {
        asset_selection.sort();
        asset_selection.dedup();
        let mut request_tags = BTreeMap::new();
        request_tags.insert(tags::AUTO_MATERIALIZE.to_string(), "true".to_string());
        request_tags.insert(tags::OBSERVATION.to_string(), "true".to_string());
        Self {
            asset_selection,
            partition_key: None,
            tags: request_tags,
        }
    }

    /// Returns true if this is an observation request.
    #[must_use]
    pub fn is_observation(&self) -> bool {
        self.tags.contains_key(tags::OBSERVATION)
    }

    /// Deterministic fingerprint of the request payload.
    ///
    /// Identical inputs to the evaluator yield identical fingerprints,
    /// which makes requests comparable across retries of one evaluation.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Payload<'a> {
            asset_selection: Vec<String>,
            partition_key: Option<&'a str>,
            tags: &'a BTreeMap<String, String>,
        }

        let payload = Payload {
            asset_selection: self
                .asset_selection
                .iter()
                .map(AssetKey::to_user_string)
                .collect(),
            partition_key: self.partition_key.as_deref(),
            tags: &self.tags,
        };

        // The payload is plain data; serializing it cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        hex::encode(Sha256::digest(&json))
    }
}
