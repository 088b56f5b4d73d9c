//! The static asset dependency graph.
//!
//! Built once per evaluation from the full set of asset definitions visible
//! in the workspace. Construction validates the definitions (unique keys,
//! known dependencies, acyclicity); after that the graph is immutable and
//! every query is deterministic, with ties broken by [`AssetKey`] order.

use std::collections::BTreeSet;

use crate::dag::Dag;
use crate::error::{Error, Result};
use crate::partitions::PartitionsDefinition;
use crate::policy::{AutoMaterializePolicy, FreshnessPolicy};
use vela_core::AssetKey;

/// One asset definition as registered by a workspace.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    /// The asset's key.
    pub key: AssetKey,
    /// Upstream dependencies (asset keys this asset reads from).
    pub deps: Vec<AssetKey>,
    /// Partition space, if the asset is partitioned.
    pub partitions_def: Option<PartitionsDefinition>,
    /// Per-asset materialization policy, if declared.
    pub auto_materialize_policy: Option<AutoMaterializePolicy>,
    /// Freshness constraint, if declared.
    pub freshness_policy: Option<FreshnessPolicy>,
    /// True for externally-produced assets: never materialized by the
    /// engine, only observed.
    pub is_source: bool,
    /// True for source assets that support staleness detection via
    /// periodic observation.
    pub is_observable: bool,
    /// Observation cadence for observable sources, in minutes.
    pub auto_observe_interval_minutes: Option<u32>,
    /// Code location the asset is defined in. Observation requests are
    /// grouped per location.
    pub location: Option<String>,
}

impl AssetSpec {
    /// Creates a spec with no dependencies, partitions, or policies.
    #[must_use]
    pub fn new(key: AssetKey) -> Self {
        Self {
            key,
            deps: Vec::new(),
            partitions_def: None,
            auto_materialize_policy: None,
            freshness_policy: None,
            is_source: false,
            is_observable: false,
            auto_observe_interval_minutes: None,
            location: None,
        }
    }

    /// Declares upstream dependencies.
    #[must_use]
    pub fn with_deps(mut self, deps: impl IntoIterator<Item = AssetKey>) -> Self {
        self.deps = deps.into_iter().collect();
        self
    }

    /// Declares the partition space.
    #[must_use]
    pub fn with_partitions(mut self, def: PartitionsDefinition) -> Self {
        self.partitions_def = Some(def);
        self
    }

    /// Declares the auto-materialize policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AutoMaterializePolicy) -> Self {
        self.auto_materialize_policy = Some(policy);
        self
    }

    /// Declares the freshness policy.
    #[must_use]
    pub fn with_freshness_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.freshness_policy = Some(policy);
        self
    }

    /// Marks the asset as externally produced.
    #[must_use]
    pub fn as_source(mut self) -> Self {
        self.is_source = true;
        self
    }

    /// Marks the asset as an observable source with the given observation
    /// cadence. Implies `is_source`.
    #[must_use]
    pub fn as_observable(mut self, interval_minutes: u32) -> Self {
        self.is_source = true;
        self.is_observable = true;
        self.auto_observe_interval_minutes = Some(interval_minutes);
        self
    }

    /// Declares the code location the asset belongs to.
    #[must_use]
    pub fn in_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// One node of the built graph: the spec plus derived adjacency.
#[derive(Debug, Clone)]
pub struct AssetNode {
    spec: AssetSpec,
    upstream: BTreeSet<AssetKey>,
    downstream: BTreeSet<AssetKey>,
}

impl AssetNode {
    /// The asset's key.
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        &self.spec.key
    }

    /// The original definition.
    #[must_use]
    pub fn spec(&self) -> &AssetSpec {
        &self.spec
    }

    /// In-graph upstream keys. External references are validated at build
    /// time but do not appear here.
    #[must_use]
    pub fn upstream(&self) -> &BTreeSet<AssetKey> {
        &self.upstream
    }

    /// In-graph downstream keys (the exact inverse of `upstream` across
    /// the graph).
    #[must_use]
    pub fn downstream(&self) -> &BTreeSet<AssetKey> {
        &self.downstream
    }

    /// True if the asset has no in-graph upstream.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.upstream.is_empty()
    }
}

/// Builder for [`AssetGraph`].
#[derive(Debug, Default)]
pub struct AssetGraphBuilder {
    specs: Vec<AssetSpec>,
    external: BTreeSet<AssetKey>,
}

impl AssetGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset definition.
    #[must_use]
    pub fn add_asset(mut self, spec: AssetSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Registers a key as an external/source reference: dependencies on it
    /// are valid even though no definition exists in this graph.
    #[must_use]
    pub fn add_external(mut self, key: AssetKey) -> Self {
        self.external.insert(key);
        self
    }

    /// Builds and validates the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if two definitions share a key, a dependency
    /// references a key that is neither defined nor external, or the
    /// dependency relation contains a cycle.
    pub fn build(self) -> Result<AssetGraph> {
        let defined: BTreeSet<AssetKey> = {
            let mut seen = BTreeSet::new();
            for spec in &self.specs {
                if !seen.insert(spec.key.clone()) {
                    return Err(Error::DuplicateAssetKey {
                        key: spec.key.clone(),
                    });
                }
            }
            seen
        };

        let mut dag: Dag<AssetKey> = Dag::new();
        for spec in &self.specs {
            dag.add_node(spec.key.clone());
        }

        let mut nodes = std::collections::BTreeMap::new();
        for spec in &self.specs {
            let mut upstream = BTreeSet::new();
            for dep in &spec.deps {
                if defined.contains(dep) {
                    upstream.insert(dep.clone());
                } else if !self.external.contains(dep) {
                    return Err(Error::DependencyNotFound {
                        asset_key: spec.key.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            for dep in &upstream {
                let from = dag.add_node(dep.clone());
                let to = dag.add_node(spec.key.clone());
                dag.add_edge(from, to)?;
            }
            nodes.insert(
                spec.key.clone(),
                AssetNode {
                    spec: spec.clone(),
                    upstream,
                    downstream: BTreeSet::new(),
                },
            );
        }

        // Derive the downstream sets as the inverse of upstream.
        let edges: Vec<(AssetKey, AssetKey)> = nodes
            .values()
            .flat_map(|node| {
                node.upstream
                    .iter()
                    .map(|up| (up.clone(), node.spec.key.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (up, down) in edges {
            if let Some(node) = nodes.get_mut(&up) {
                node.downstream.insert(down);
            }
        }

        // Cycle check and cached deterministic evaluation order.
        let topo = dag.toposort()?;

        Ok(AssetGraph { nodes, dag, topo })
    }
}

/// The validated, immutable asset dependency graph.
#[derive(Debug, Clone)]
pub struct AssetGraph {
    nodes: std::collections::BTreeMap<AssetKey, AssetNode>,
    dag: Dag<AssetKey>,
    topo: Vec<AssetKey>,
}

impl AssetGraph {
    /// Builds a graph directly from specs, with no external references.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AssetGraphBuilder::build`].
    pub fn from_specs(specs: impl IntoIterator<Item = AssetSpec>) -> Result<Self> {
        specs
            .into_iter()
            .fold(AssetGraphBuilder::new(), AssetGraphBuilder::add_asset)
            .build()
    }

    /// Looks up a node by key.
    #[must_use]
    pub fn get(&self, key: &AssetKey) -> Option<&AssetNode> {
        self.nodes.get(key)
    }

    /// Returns true if the graph defines `key`.
    #[must_use]
    pub fn contains(&self, key: &AssetKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of assets in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.nodes.values()
    }

    /// Topological evaluation order: parents before children, ties broken
    /// by key order. Stable across calls and processes.
    #[must_use]
    pub fn toposort(&self) -> &[AssetKey] {
        &self.topo
    }

    /// Direct in-graph upstream keys of `key`.
    #[must_use]
    pub fn upstream_of(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.nodes
            .get(key)
            .map(|n| n.upstream.clone())
            .unwrap_or_default()
    }

    /// Direct in-graph downstream keys of `key`.
    #[must_use]
    pub fn downstream_of(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.nodes
            .get(key)
            .map(|n| n.downstream.clone())
            .unwrap_or_default()
    }

    /// Every key transitively upstream of `key`.
    #[must_use]
    pub fn ancestors(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.dag.ancestors(key)
    }

    /// Every key transitively downstream of `key`.
    #[must_use]
    pub fn descendants(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.dag.descendants(key)
    }

    /// Keys with no in-graph upstream, in key order.
    #[must_use]
    pub fn root_keys(&self) -> Vec<AssetKey> {
        self.nodes
            .values()
            .filter(|n| n.is_root())
            .map(|n| n.spec.key.clone())
            .collect()
    }
}
