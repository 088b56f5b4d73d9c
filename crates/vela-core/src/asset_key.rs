//! Strongly-typed asset identity.
//!
//! Assets are identified by an ordered sequence of path segments
//! (e.g. `analytics/users`). Keys are totally ordered so that every
//! traversal, grouping, and serialization in the engine is deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between key segments in the user-facing string form.
pub const KEY_SEPARATOR: char = '/';

/// An ordered sequence of path segments identifying one asset.
///
/// Keys are opaque identifiers: the engine never interprets segments beyond
/// ordering and equality. The total order (lexicographic over segments) is
/// load-bearing — tie-breaking in topological traversal and the ordering of
/// run requests both rely on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    /// Creates an asset key from path segments.
    ///
    /// # Errors
    ///
    /// Returns an error if no segments are given, or if any segment is
    /// empty, contains whitespace, or contains the separator character.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(Error::invalid_key("asset key requires at least one segment"));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// Creates a single-segment asset key.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is invalid.
    pub fn single(segment: impl Into<String>) -> Result<Self> {
        Self::new([segment.into()])
    }

    /// Parses the user-facing string form (`seg/seg/...`).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or any segment is invalid.
    pub fn from_user_string(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::invalid_key("asset key cannot be empty"));
        }
        Self::new(s.split(KEY_SEPARATOR))
    }

    /// Returns the user-facing string form (`seg/seg/...`).
    #[must_use]
    pub fn to_user_string(&self) -> String {
        self.0.join(&KEY_SEPARATOR.to_string())
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::invalid_key("asset key segment cannot be empty"));
    }
    if segment.chars().any(char::is_whitespace) {
        return Err(Error::invalid_key(format!(
            "asset key segment '{segment}' cannot contain whitespace"
        )));
    }
    if segment.contains(KEY_SEPARATOR) {
        return Err(Error::invalid_key(format!(
            "asset key segment '{segment}' cannot contain '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

/// The unit of reconciliation decision-making: one asset plus an optional
/// partition key.
///
/// Unpartitioned assets use `partition_key: None` as the single implicit
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKeyPartitionKey {
    /// The asset this decision concerns.
    pub asset_key: AssetKey,
    /// The partition within the asset's key space, if partitioned.
    pub partition_key: Option<String>,
}

impl AssetKeyPartitionKey {
    /// Creates the implicit unpartitioned entry for an asset.
    #[must_use]
    pub fn unpartitioned(asset_key: AssetKey) -> Self {
        Self {
            asset_key,
            partition_key: None,
        }
    }

    /// Creates an entry for one partition of an asset.
    #[must_use]
    pub fn partitioned(asset_key: AssetKey, partition_key: impl Into<String>) -> Self {
        Self {
            asset_key,
            partition_key: Some(partition_key.into()),
        }
    }
}

impl fmt::Display for AssetKeyPartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition_key {
            Some(partition) => write!(f, "{}[{partition}]", self.asset_key),
            None => write!(f, "{}", self.asset_key),
        }
    }
}
