//! # vela-recon
//!
//! Asset reconciliation engine for the Vela data platform.
//!
//! This crate decides, given a directed acyclic graph of data assets (with
//! optional partitioning) and the historical record of what has been
//! materialized, observed, and requested, which assets and partitions must
//! be recomputed right now. It emits concrete run requests plus a persisted
//! cursor for the next evaluation.
//!
//! ## Core Concepts
//!
//! - **Asset Graph**: the static dependency graph over asset keys, each
//!   with optional partitions, freshness, and auto-materialize policies
//! - **Partition Subset**: a compact set of partition keys scoped to one
//!   partitions definition, with union and a bounded serialized form
//! - **Cursor**: versioned state carried between evaluations recording
//!   what has already been handled
//! - **Evaluation**: a per-asset audit record explaining why each asset
//!   was or wasn't materialized
//!
//! ## Guarantees
//!
//! - **Deterministic**: identical inputs produce byte-identical run
//!   requests and cursor
//! - **Atomic**: an evaluation either returns a complete outcome or fails
//!   with no partial effects
//! - **Explainable**: every decision is traceable to a recorded condition
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use vela_core::AssetKey;
//! use vela_recon::cursor::ReconciliationCursor;
//! use vela_recon::evaluator::{EvaluationContext, Reconciler, ReconcilerConfig};
//! use vela_recon::graph::{AssetGraph, AssetSpec};
//! use vela_recon::selection::AssetSelection;
//! use vela_recon::store::InMemoryEventLog;
//!
//! # fn main() -> vela_recon::error::Result<()> {
//! let graph = AssetGraph::from_specs([
//!     AssetSpec::new(AssetKey::from_user_string("raw/events")?),
//! ])?;
//!
//! let reconciler = Reconciler::new(ReconcilerConfig::default());
//! let view = InMemoryEventLog::new();
//! let cursor = ReconciliationCursor::empty();
//! let outcome = reconciler.evaluate(&EvaluationContext {
//!     graph: &graph,
//!     cursor: &cursor,
//!     selection: &AssetSelection::All,
//!     now: Utc::now(),
//!     view: &view,
//! })?;
//!
//! // The never-materialized eager asset is requested exactly once.
//! assert_eq!(outcome.run_requests.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

// Internal modules - not exposed in public API.
pub(crate) mod dag;

pub mod cursor;
pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod graph;
pub mod metrics;
pub mod partitions;
pub mod policy;
pub mod run_request;
pub mod selection;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cursor::ReconciliationCursor;
    pub use crate::error::{Error, Result};
    pub use crate::evaluation::{AutoMaterializeAssetEvaluation, ConditionKind, Decision};
    pub use crate::evaluator::{
        EvaluationContext, Reconciler, ReconcilerConfig, ReconciliationOutcome,
    };
    pub use crate::graph::{AssetGraph, AssetGraphBuilder, AssetNode, AssetSpec};
    pub use crate::partitions::{
        Cadence, PartitionKeyRange, PartitionSubset, PartitionsDefinition, TimeWindow,
        TimeWindowPartitionsDefinition,
    };
    pub use crate::policy::{AutoMaterializePolicy, FreshnessPolicy, PolicyKind};
    pub use crate::run_request::RunRequest;
    pub use crate::selection::AssetSelection;
    pub use crate::store::{EventKind, EventLogRecord, EventLogView, InMemoryEventLog};
    pub use vela_core::{AssetKey, AssetKeyPartitionKey};
}
