//! Directed Acyclic Graph (DAG) for asset dependency management.
//!
//! This module provides the graph machinery behind [`crate::graph::AssetGraph`]:
//! topological sorting for deterministic evaluation order, and reachability
//! queries for freshness propagation.
//!
//! **Note:** This module is internal to `vela-recon` to preserve freedom to
//! change internals.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};

/// A directed acyclic graph for dependency management.
///
/// The DAG supports:
/// - Adding nodes and directed edges
/// - Topological sorting (for evaluation order)
/// - Querying direct upstream/downstream neighbors
/// - Transitive reachability (ancestors and descendants)
/// - Cycle detection
///
/// All queries are deterministic: whenever several nodes are equally
/// eligible, ties are broken by the node value's `Ord`, never by insertion
/// order or hash iteration.
#[derive(Debug, Clone)]
pub(crate) struct Dag<T>
where
    T: Clone + Eq + Ord + Hash + Display,
{
    /// The underlying petgraph graph.
    graph: DiGraph<T, ()>,
    /// Map from node value to node index for fast lookup.
    index_map: HashMap<T, NodeIndex>,
}

impl<T> Dag<T>
where
    T: Clone + Eq + Ord + Hash + Display,
{
    /// Creates a new empty DAG.
    pub(crate) fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_map: HashMap::new(),
        }
    }

    /// Returns the number of nodes in the DAG.
    #[allow(dead_code)]
    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Adds a node to the DAG.
    ///
    /// If the node already exists, this is a no-op.
    /// Returns the node index for use with other methods.
    pub(crate) fn add_node(&mut self, value: T) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(&value) {
            return idx;
        }
        let idx = self.graph.add_node(value.clone());
        self.index_map.insert(value, idx);
        idx
    }

    /// Adds a directed edge from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node index is invalid.
    pub(crate) fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) -> Result<()> {
        self.graph
            .node_weight(from)
            .ok_or_else(|| Error::DagNodeNotFound {
                node: format!("index {}", from.index()),
            })?;
        self.graph
            .node_weight(to)
            .ok_or_else(|| Error::DagNodeNotFound {
                node: format!("index {}", to.index()),
            })?;

        self.graph.add_edge(from, to, ());
        Ok(())
    }

    /// Returns the node index for a value, if it exists.
    pub(crate) fn get_index(&self, value: &T) -> Option<NodeIndex> {
        self.index_map.get(value).copied()
    }

    /// Returns a topologically sorted list of nodes.
    ///
    /// Uses Kahn's algorithm with deterministic tie-breaking: whenever
    /// multiple nodes have zero in-degree, the smallest by `Ord` is
    /// processed first, so the order is a pure function of the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub(crate) fn toposort(&self) -> Result<Vec<T>> {
        let node_count = self.graph.node_count();
        if node_count == 0 {
            return Ok(Vec::new());
        }

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(node_count);
        for idx in self.graph.node_indices() {
            in_degree.insert(idx, 0);
        }
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        // Ready set ordered by node value so ties resolve deterministically.
        let mut ready: BTreeSet<T> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree.get(idx).copied().unwrap_or(0) == 0)
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect();

        let mut result = Vec::with_capacity(node_count);

        while let Some(value) = ready.pop_first() {
            let idx = self
                .get_index(&value)
                .ok_or_else(|| Error::DagNodeNotFound {
                    node: value.to_string(),
                })?;
            result.push(value);

            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        if let Some(weight) = self.graph.node_weight(neighbor) {
                            ready.insert(weight.clone());
                        }
                    }
                }
            }
        }

        // Cycle detection: if we didn't visit all nodes, there's a cycle.
        if result.len() != node_count {
            let mut remaining: Vec<String> = self
                .graph
                .node_indices()
                .filter(|idx| in_degree.get(idx).copied().unwrap_or(0) > 0)
                .filter_map(|idx| self.graph.node_weight(idx))
                .map(ToString::to_string)
                .collect();
            remaining.sort();

            return Err(Error::CycleDetected { cycle: remaining });
        }

        Ok(result)
    }

    /// Returns the direct upstream neighbors of a node (nodes that point to it).
    ///
    /// Results are sorted by node value.
    #[allow(dead_code)]
    pub(crate) fn upstream(&self, value: &T) -> Vec<T> {
        self.neighbors_sorted(value, Direction::Incoming)
    }

    /// Returns the direct downstream neighbors of a node (nodes it points to).
    ///
    /// Results are sorted by node value.
    #[allow(dead_code)]
    pub(crate) fn downstream(&self, value: &T) -> Vec<T> {
        self.neighbors_sorted(value, Direction::Outgoing)
    }

    /// Returns every node transitively upstream of `value` (excluding it).
    pub(crate) fn ancestors(&self, value: &T) -> BTreeSet<T> {
        self.reachable(value, Direction::Incoming)
    }

    /// Returns every node transitively downstream of `value` (excluding it).
    pub(crate) fn descendants(&self, value: &T) -> BTreeSet<T> {
        self.reachable(value, Direction::Outgoing)
    }

    fn neighbors_sorted(&self, value: &T, direction: Direction) -> Vec<T> {
        let Some(idx) = self.get_index(value) else {
            return Vec::new();
        };
        let mut neighbors: Vec<T> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        neighbors.sort();
        neighbors
    }

    fn reachable(&self, value: &T, direction: Direction) -> BTreeSet<T> {
        let Some(start) = self.get_index(value) else {
            return BTreeSet::new();
        };
        let mut seen: BTreeSet<T> = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(idx, direction) {
                if let Some(weight) = self.graph.node_weight(neighbor) {
                    if seen.insert(weight.clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        seen
    }
}

impl<T> Default for Dag<T>
where
    T: Clone + Eq + Ord + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag_from_edges(edges: &[(&str, &str)]) -> Dag<String> {
        let mut dag: Dag<String> = Dag::new();
        for (from, to) in edges {
            let f = dag.add_node((*from).to_string());
            let t = dag.add_node((*to).to_string());
            dag.add_edge(f, t).unwrap();
        }
        dag
    }

    #[test]
    fn empty_dag_has_no_nodes() {
        let dag: Dag<String> = Dag::new();
        assert_eq!(dag.node_count(), 0);
        assert!(dag.toposort().unwrap().is_empty());
    }

    #[test]
    fn linear_dag_sorts_correctly() {
        let dag = dag_from_edges(&[("a", "b"), ("b", "c")]);
        assert_eq!(dag.toposort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn toposort_breaks_ties_by_node_order() {
        // z and a are both roots; a must come first regardless of the order
        // nodes were inserted.
        let mut dag: Dag<String> = Dag::new();
        let z = dag.add_node("z".into());
        let a = dag.add_node("a".into());
        let m = dag.add_node("m".into());
        dag.add_edge(z, m).unwrap();
        dag.add_edge(a, m).unwrap();

        assert_eq!(dag.toposort().unwrap(), vec!["a", "z", "m"]);
    }

    #[test]
    fn dag_detects_cycle() {
        let dag = dag_from_edges(&[("a", "b"), ("b", "a")]);
        let result = dag.toposort();
        assert!(matches!(result, Err(Error::CycleDetected { .. })));
    }

    #[test]
    fn upstream_and_downstream_are_sorted() {
        let dag = dag_from_edges(&[("z", "c"), ("a", "c"), ("c", "y"), ("c", "b")]);
        assert_eq!(dag.upstream(&"c".to_string()), vec!["a", "z"]);
        assert_eq!(dag.downstream(&"c".to_string()), vec!["b", "y"]);
    }

    #[test]
    fn ancestors_are_transitive() {
        let dag = dag_from_edges(&[("a", "b"), ("b", "c"), ("x", "c")]);
        let ancestors = dag.ancestors(&"c".to_string());
        let expected: BTreeSet<String> =
            ["a", "b", "x"].iter().map(ToString::to_string).collect();
        assert_eq!(ancestors, expected);
    }

    #[test]
    fn descendants_are_transitive() {
        let dag = dag_from_edges(&[("a", "b"), ("b", "c"), ("b", "d")]);
        let descendants = dag.descendants(&"a".to_string());
        let expected: BTreeSet<String> =
            ["b", "c", "d"].iter().map(ToString::to_string).collect();
        assert_eq!(descendants, expected);
    }

    #[test]
    fn queries_on_unknown_node_are_empty() {
        let dag = dag_from_edges(&[("a", "b")]);
        assert!(dag.upstream(&"nope".to_string()).is_empty());
        assert!(dag.ancestors(&"nope".to_string()).is_empty());
    }

    #[test]
    fn toposort_is_stable_across_calls() {
        let dag = dag_from_edges(&[("a", "c"), ("b", "c"), ("c", "d")]);
        let first = dag.toposort().unwrap();
        assert_eq!(dag.toposort().unwrap(), first);
        assert_eq!(first, vec!["a", "b", "c", "d"]);
    }
}
