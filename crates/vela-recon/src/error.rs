//! Error types for the reconciliation domain.
//!
//! Two classes of failure exist (and only the first is represented here):
//! configuration errors abort a whole evaluation synchronously, while data
//! errors (a partition key that fell out of its definition's key space, an
//! event for an unknown asset) are recovered locally by skipping the
//! affected target and never surface as an `Error`.

use vela_core::AssetKey;

/// The result type used throughout vela-recon.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reconciliation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two asset definitions registered the same key.
    #[error("duplicate asset key: {key}")]
    DuplicateAssetKey {
        /// The key registered more than once.
        key: AssetKey,
    },

    /// A declared dependency references a key that is neither a known asset
    /// nor an explicitly registered external reference.
    #[error("asset {asset_key} depends on unknown key {dependency}")]
    DependencyNotFound {
        /// The asset declaring the dependency.
        asset_key: AssetKey,
        /// The missing dependency key.
        dependency: AssetKey,
    },

    /// A cycle was detected in the asset dependency graph.
    #[error("cycle detected in asset graph: {cycle:?}")]
    CycleDetected {
        /// The cycle path (asset key strings).
        cycle: Vec<String>,
    },

    /// A DAG node was not found (internal graph operation error).
    #[error("DAG node not found: {node}")]
    DagNodeNotFound {
        /// The node identifier (index or value).
        node: String,
    },

    /// Two partition subsets belong to incompatible partitions definitions.
    #[error("incompatible partitions definitions: {left} vs {right}")]
    IncompatiblePartitions {
        /// Family fingerprint of the left-hand subset.
        left: String,
        /// Family fingerprint of the right-hand subset.
        right: String,
    },

    /// A partition key is not part of its definition's current key space.
    #[error("partition key '{partition_key}' is not in the key space of {definition}")]
    InvalidPartitionKey {
        /// The rejected partition key.
        partition_key: String,
        /// Human-readable description of the definition.
        definition: String,
    },

    /// A cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCronExpression {
        /// The offending expression.
        expression: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A timezone name could not be resolved.
    #[error("invalid timezone: {timezone}")]
    InvalidTimezone {
        /// The offending timezone name.
        timezone: String,
    },

    /// An asset carries an `AutoMaterializePolicy` but the evaluator was
    /// configured without per-asset policy support.
    #[error(
        "asset {asset_key} has an AutoMaterializePolicy set, but this reconciler \
         was built without per-asset policy support"
    )]
    PolicyNotSupported {
        /// The asset carrying the unsupported policy.
        asset_key: AssetKey,
    },

    /// A persisted cursor payload matched no known schema.
    #[error("cursor decode failed: {message}")]
    CursorDecode {
        /// Description of the decode failure.
        message: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from vela-core.
    #[error("core error: {0}")]
    Core(#[from] vela_core::Error),
}

impl Error {
    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new cursor decode error.
    #[must_use]
    pub fn cursor_decode(message: impl Into<String>) -> Self {
        Self::CursorDecode {
            message: message.into(),
        }
    }
}
