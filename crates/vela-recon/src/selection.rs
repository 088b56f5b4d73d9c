//! Asset selection: the predicate restricting which assets one
//! reconciliation sensor instance is responsible for.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::AssetGraph;
use vela_core::AssetKey;

/// A predicate over asset keys.
///
/// Multiple independent sensors may evaluate concurrently against the same
/// event log, each owning a disjoint selection and its own cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSelection {
    /// Every asset in the graph.
    All,
    /// Exactly the named keys.
    Keys(BTreeSet<AssetKey>),
}

impl AssetSelection {
    /// A selection of the given keys.
    #[must_use]
    pub fn keys(keys: impl IntoIterator<Item = AssetKey>) -> Self {
        Self::Keys(keys.into_iter().collect())
    }

    /// Returns true if `key` is selected.
    #[must_use]
    pub fn contains(&self, key: &AssetKey) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }

    /// Resolves the selection against a graph, in key order.
    #[must_use]
    pub fn resolve(&self, graph: &AssetGraph) -> Vec<AssetKey> {
        graph
            .nodes()
            .map(|n| n.key().clone())
            .filter(|k| self.contains(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AssetSpec;

    fn key(s: &str) -> AssetKey {
        AssetKey::from_user_string(s).unwrap()
    }

    #[test]
    fn all_selects_everything() {
        let graph =
            AssetGraph::from_specs([AssetSpec::new(key("a")), AssetSpec::new(key("b"))]).unwrap();
        assert_eq!(AssetSelection::All.resolve(&graph), vec![key("a"), key("b")]);
    }

    #[test]
    fn keys_selects_the_intersection() {
        let graph =
            AssetGraph::from_specs([AssetSpec::new(key("a")), AssetSpec::new(key("b"))]).unwrap();
        let selection = AssetSelection::keys([key("b"), key("z")]);
        assert_eq!(selection.resolve(&graph), vec![key("b")]);
        assert!(selection.contains(&key("z")));
        assert!(!selection.contains(&key("a")));
    }
}
