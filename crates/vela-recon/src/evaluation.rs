//! Per-asset evaluation records: the audit trail explaining why each asset
//! was or wasn't materialized.
//!
//! Records are a pure projection of the evaluator's decision trace. They
//! are persisted for reporting and never feed back into later decisions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::AssetGraph;
use vela_core::{AssetKey, AssetKeyPartitionKey};

/// The condition that fired for one (asset, partition) target.
///
/// Variant order is the evaluation priority order and is a total order:
/// the evaluator checks conditions in exactly this sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Never materialized/observed, with no unmet upstream dependency.
    Missing,
    /// At least one upstream has data newer than this asset's own.
    ParentUpdated,
    /// An upstream is itself stale or missing; deferred, not requested.
    ParentOutdated,
    /// A freshness policy requires data before the next plausible
    /// evaluation.
    FreshnessDue,
    /// The per-asset materialization cap was reached; discarded.
    RateLimited,
}

/// What a fired condition does with its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Include the target in a run request.
    Materialize,
    /// Defer the target; it stays eligible for a later evaluation.
    Skip,
    /// Drop the target this evaluation (rate limiting).
    Discard,
}

impl ConditionKind {
    /// Maps the condition to its decision.
    #[must_use]
    pub fn decision(self) -> Decision {
        match self {
            Self::Missing | Self::ParentUpdated | Self::FreshnessDue => Decision::Materialize,
            Self::ParentOutdated => Decision::Skip,
            Self::RateLimited => Decision::Discard,
        }
    }
}

/// The serialized subset of partitions a condition applied to, or `None`
/// for unpartitioned assets.
pub type ConditionSubset = Option<crate::partitions::PartitionSubset>;

/// One asset's audit record for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoMaterializeAssetEvaluation {
    /// The asset evaluated.
    pub asset_key: AssetKey,
    /// Number of targets included in run requests.
    pub num_requested: usize,
    /// Number of targets deferred.
    pub num_skipped: usize,
    /// Number of targets discarded.
    pub num_discarded: usize,
    /// Which condition fired for which partitions, in priority order.
    pub partition_subsets_by_condition: Vec<(ConditionKind, ConditionSubset)>,
}

/// Builds one evaluation record per touched asset from the evaluator's
/// decision trace.
///
/// Output is sorted by asset key; each record's condition list is sorted by
/// condition priority, so re-serialization is stable for comparison.
#[must_use]
pub fn build_evaluations(
    graph: &AssetGraph,
    trace: &BTreeMap<AssetKeyPartitionKey, ConditionKind>,
) -> Vec<AutoMaterializeAssetEvaluation> {
    let mut per_asset: BTreeMap<&AssetKey, BTreeMap<ConditionKind, Vec<&Option<String>>>> =
        BTreeMap::new();
    for (target, condition) in trace {
        per_asset
            .entry(&target.asset_key)
            .or_default()
            .entry(*condition)
            .or_default()
            .push(&target.partition_key);
    }

    per_asset
        .into_iter()
        .map(|(asset_key, by_condition)| {
            let mut num_requested = 0;
            let mut num_skipped = 0;
            let mut num_discarded = 0;
            let mut partition_subsets_by_condition = Vec::new();

            for (condition, partitions) in by_condition {
                match condition.decision() {
                    Decision::Materialize => num_requested += partitions.len(),
                    Decision::Skip => num_skipped += partitions.len(),
                    Decision::Discard => num_discarded += partitions.len(),
                }

                let partitioned_keys: Vec<String> = partitions
                    .iter()
                    .filter_map(|p| p.as_ref().cloned())
                    .collect();
                let subset = if partitioned_keys.is_empty() {
                    None
                } else {
                    graph
                        .get(asset_key)
                        .and_then(|node| node.spec().partitions_def.as_ref())
                        .map(|def| def.subset_with_known_keys(partitioned_keys))
                };
                partition_subsets_by_condition.push((condition, subset));
            }

            AutoMaterializeAssetEvaluation {
                asset_key: asset_key.clone(),
                num_requested,
                num_skipped,
                num_discarded,
                partition_subsets_by_condition,
            }
        })
        .collect()
}
