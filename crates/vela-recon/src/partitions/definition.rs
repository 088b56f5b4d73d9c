//! Partition space definitions.
//!
//! A definition produces the total ordered set of partition keys that exist
//! as of a given evaluation time. For time-window variants this set grows
//! monotonically with time; for dynamic variants it is read from the
//! dynamic-partitions registry on the query surface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::partitions::time_window::TimeWindow;

/// Key format for date-grained windows.
const DAILY_KEY_FORMAT: &str = "%Y-%m-%d";
/// Key format for sub-date-grained windows.
const TIMESTAMP_KEY_FORMAT: &str = "%Y-%m-%d-%H:%M";

/// Cadence of a time-window partition series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// One window per hour.
    Hourly,
    /// One window per day.
    Daily,
    /// Windows between consecutive ticks of a cron schedule.
    Cron {
        /// Cron expression in `cron` crate syntax.
        expression: String,
    },
}

impl Cadence {
    fn key_format(&self) -> &'static str {
        match self {
            Self::Daily => DAILY_KEY_FORMAT,
            Self::Hourly | Self::Cron { .. } => TIMESTAMP_KEY_FORMAT,
        }
    }
}

/// A time-window partition series anchored at a start instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowPartitionsDefinition {
    /// First window boundary. No partition exists before this instant.
    pub start: DateTime<Utc>,
    /// Window cadence.
    pub cadence: Cadence,
    /// IANA timezone name used for key formatting and cron evaluation.
    /// Defaults to UTC when absent.
    pub timezone: Option<String>,
}

impl TimeWindowPartitionsDefinition {
    /// Creates a daily series anchored at `start`.
    #[must_use]
    pub fn daily(start: DateTime<Utc>) -> Self {
        Self {
            start,
            cadence: Cadence::Daily,
            timezone: None,
        }
    }

    /// Creates an hourly series anchored at `start`.
    #[must_use]
    pub fn hourly(start: DateTime<Utc>) -> Self {
        Self {
            start,
            cadence: Cadence::Hourly,
            timezone: None,
        }
    }

    /// Creates a cron-cadence series anchored at `start`.
    #[must_use]
    pub fn with_cron(start: DateTime<Utc>, expression: impl Into<String>) -> Self {
        Self {
            start,
            cadence: Cadence::Cron {
                expression: expression.into(),
            },
            timezone: None,
        }
    }

    /// Sets the timezone used for key formatting and cron evaluation.
    #[must_use]
    pub fn in_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    fn tz(&self) -> Result<Tz> {
        match &self.timezone {
            None => Ok(Tz::UTC),
            Some(name) => name.parse().map_err(|_| Error::InvalidTimezone {
                timezone: name.clone(),
            }),
        }
    }

    /// Returns every complete window (`end <= now`), in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression or timezone is invalid.
    pub fn windows_through(&self, now: DateTime<Utc>) -> Result<Vec<TimeWindow>> {
        let mut windows = Vec::new();
        match &self.cadence {
            Cadence::Hourly | Cadence::Daily => {
                let step = match self.cadence {
                    Cadence::Hourly => Duration::hours(1),
                    _ => Duration::days(1),
                };
                let mut cursor = self.start;
                while cursor + step <= now {
                    // Windows are never degenerate: step is a positive duration.
                    if let Some(window) = TimeWindow::new(cursor, cursor + step) {
                        windows.push(window);
                    }
                    cursor += step;
                }
            }
            Cadence::Cron { expression } => {
                let schedule = Schedule::from_str(expression).map_err(|e| {
                    Error::InvalidCronExpression {
                        expression: expression.clone(),
                        message: e.to_string(),
                    }
                })?;
                let tz = self.tz()?;
                let anchor = self.start.with_timezone(&tz) - Duration::seconds(1);
                let mut ticks = schedule.after(&anchor);
                let mut previous: Option<DateTime<Utc>> = ticks.next().map(|t| t.with_timezone(&Utc));
                for tick in ticks {
                    let tick = tick.with_timezone(&Utc);
                    if tick > now {
                        break;
                    }
                    if let Some(start) = previous {
                        if let Some(window) = TimeWindow::new(start, tick) {
                            windows.push(window);
                        }
                    }
                    previous = Some(tick);
                }
            }
        }
        Ok(windows)
    }

    /// Returns the most recent complete window as of `now`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression or timezone is invalid.
    pub fn latest_window(&self, now: DateTime<Utc>) -> Result<Option<TimeWindow>> {
        Ok(self.windows_through(now)?.into_iter().next_back())
    }

    /// Formats the partition key naming `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timezone is invalid.
    pub fn key_for_window(&self, window: &TimeWindow) -> Result<String> {
        let tz = self.tz()?;
        Ok(window
            .start
            .with_timezone(&tz)
            .format(self.cadence.key_format())
            .to_string())
    }

    /// Parses a partition key back into its window.
    ///
    /// The key is trusted to name a window boundary; callers validating
    /// membership against the current key space do so separately.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not parse, or the cron expression
    /// or timezone is invalid.
    pub fn window_for_key(&self, key: &str) -> Result<TimeWindow> {
        let tz = self.tz()?;
        let start_local = match &self.cadence {
            Cadence::Daily => {
                let date = NaiveDate::parse_from_str(key, DAILY_KEY_FORMAT).map_err(|_| {
                    Error::InvalidPartitionKey {
                        partition_key: key.to_string(),
                        definition: self.to_string(),
                    }
                })?;
                date.and_time(self.start.with_timezone(&tz).time())
            }
            Cadence::Hourly | Cadence::Cron { .. } => {
                NaiveDateTime::parse_from_str(key, TIMESTAMP_KEY_FORMAT).map_err(|_| {
                    Error::InvalidPartitionKey {
                        partition_key: key.to_string(),
                        definition: self.to_string(),
                    }
                })?
            }
        };
        let start = tz
            .from_local_datetime(&start_local)
            .earliest()
            .ok_or_else(|| Error::InvalidPartitionKey {
                partition_key: key.to_string(),
                definition: self.to_string(),
            })?
            .with_timezone(&Utc);

        let end = match &self.cadence {
            Cadence::Hourly => start + Duration::hours(1),
            Cadence::Daily => start + Duration::days(1),
            Cadence::Cron { expression } => {
                let schedule = Schedule::from_str(expression).map_err(|e| {
                    Error::InvalidCronExpression {
                        expression: expression.clone(),
                        message: e.to_string(),
                    }
                })?;
                schedule
                    .after(&start.with_timezone(&tz))
                    .next()
                    .map(|t| t.with_timezone(&Utc))
                    .ok_or_else(|| Error::InvalidPartitionKey {
                        partition_key: key.to_string(),
                        definition: self.to_string(),
                    })?
            }
        };

        TimeWindow::new(start, end).ok_or_else(|| Error::InvalidPartitionKey {
            partition_key: key.to_string(),
            definition: self.to_string(),
        })
    }

    /// Returns the ordered partition keys as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression or timezone is invalid.
    pub fn partition_keys(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.windows_through(now)?
            .iter()
            .map(|w| self.key_for_window(w))
            .collect()
    }
}

impl fmt::Display for TimeWindowPartitionsDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cadence = match &self.cadence {
            Cadence::Hourly => "hourly".to_string(),
            Cadence::Daily => "daily".to_string(),
            Cadence::Cron { expression } => format!("cron[{expression}]"),
        };
        write!(f, "{cadence} partitions starting {}", self.start.to_rfc3339())
    }
}

/// One named dimension of a multi-dimensional partition space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDimension {
    /// Dimension name (unique within the definition).
    pub name: String,
    /// The dimension's own key space.
    pub definition: PartitionsDefinition,
}

/// Source of dynamically registered partition keys.
///
/// Implemented by the event-log query surface; the engine never mutates the
/// registry, it only reads the keys registered as of the evaluation
/// snapshot.
pub trait DynamicPartitionsSource {
    /// Returns the keys currently registered under `name`.
    fn dynamic_partition_keys(&self, name: &str) -> Vec<String>;
}

/// A [`DynamicPartitionsSource`] with no registrations. Useful in tests and
/// for graphs without dynamic definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDynamicPartitions;

impl DynamicPartitionsSource for NoDynamicPartitions {
    fn dynamic_partition_keys(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// An inclusive range of partition keys within one definition's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    /// First key of the range (inclusive).
    pub start: String,
    /// Last key of the range (inclusive).
    pub end: String,
}

/// A partition key space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionsDefinition {
    /// A fixed enumeration of keys, in the declared order.
    Static {
        /// The partition keys.
        keys: Vec<String>,
    },
    /// A time-window series.
    TimeWindow(TimeWindowPartitionsDefinition),
    /// A product of named dimensions. Keys are dimension keys joined with
    /// `|` in dimension-name order.
    MultiDimensional {
        /// The dimensions, sorted by name.
        dimensions: Vec<PartitionDimension>,
    },
    /// Keys registered at runtime in the dynamic-partitions registry.
    Dynamic {
        /// Registry name the keys are registered under.
        name: String,
    },
}

impl PartitionsDefinition {
    /// Creates a static enumeration definition.
    #[must_use]
    pub fn static_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Static {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a daily time-window definition anchored at `start`.
    #[must_use]
    pub fn daily(start: DateTime<Utc>) -> Self {
        Self::TimeWindow(TimeWindowPartitionsDefinition::daily(start))
    }

    /// Creates an hourly time-window definition anchored at `start`.
    #[must_use]
    pub fn hourly(start: DateTime<Utc>) -> Self {
        Self::TimeWindow(TimeWindowPartitionsDefinition::hourly(start))
    }

    /// Creates a multi-dimensional definition. Dimensions are sorted by
    /// name so key order is independent of declaration order.
    #[must_use]
    pub fn multi(dimensions: impl IntoIterator<Item = PartitionDimension>) -> Self {
        let mut dimensions: Vec<PartitionDimension> = dimensions.into_iter().collect();
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        Self::MultiDimensional { dimensions }
    }

    /// Creates a dynamic definition reading keys from the registry `name`.
    #[must_use]
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self::Dynamic { name: name.into() }
    }

    /// Returns the total ordered set of partition keys as of `now`.
    ///
    /// Dynamic keys are sorted so iteration order is deterministic
    /// regardless of registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if a time-window variant has an invalid cron
    /// expression or timezone.
    pub fn partition_keys(
        &self,
        now: DateTime<Utc>,
        dynamic: &dyn DynamicPartitionsSource,
    ) -> Result<Vec<String>> {
        match self {
            Self::Static { keys } => Ok(keys.clone()),
            Self::TimeWindow(def) => def.partition_keys(now),
            Self::MultiDimensional { dimensions } => {
                let mut product: Vec<String> = vec![String::new()];
                for (position, dimension) in dimensions.iter().enumerate() {
                    let dim_keys = dimension.definition.partition_keys(now, dynamic)?;
                    let mut next = Vec::with_capacity(product.len() * dim_keys.len());
                    for prefix in &product {
                        for key in &dim_keys {
                            if position == 0 {
                                next.push(key.clone());
                            } else {
                                next.push(format!("{prefix}|{key}"));
                            }
                        }
                    }
                    product = next;
                }
                Ok(product)
            }
            Self::Dynamic { name } => {
                let mut keys = dynamic.dynamic_partition_keys(name);
                keys.sort();
                keys.dedup();
                Ok(keys)
            }
        }
    }

    /// Returns true if `key` is in the key space as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition itself is invalid (cron or
    /// timezone); an unknown key is `Ok(false)`, not an error.
    pub fn has_partition_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
        dynamic: &dyn DynamicPartitionsSource,
    ) -> Result<bool> {
        Ok(self.partition_keys(now, dynamic)?.iter().any(|k| k == key))
    }

    /// Returns the contiguous run of keys between `range.start` and
    /// `range.end` (inclusive) in the definition's ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is not in the current key space.
    pub fn keys_in_range(
        &self,
        range: &PartitionKeyRange,
        now: DateTime<Utc>,
        dynamic: &dyn DynamicPartitionsSource,
    ) -> Result<Vec<String>> {
        let keys = self.partition_keys(now, dynamic)?;
        let start = keys.iter().position(|k| *k == range.start).ok_or_else(|| {
            Error::InvalidPartitionKey {
                partition_key: range.start.clone(),
                definition: self.describe(),
            }
        })?;
        let end = keys.iter().position(|k| *k == range.end).ok_or_else(|| {
            Error::InvalidPartitionKey {
                partition_key: range.end.clone(),
                definition: self.describe(),
            }
        })?;
        if end < start {
            return Ok(Vec::new());
        }
        Ok(keys[start..=end].to_vec())
    }

    /// Returns the definition-family fingerprint.
    ///
    /// Two subsets may be unioned, and two assets may share a run for the
    /// same partition key, only when their definitions' fingerprints match.
    #[must_use]
    pub fn family_fingerprint(&self) -> String {
        match self {
            Self::Static { keys } => {
                let mut hasher = Sha256::new();
                for key in keys {
                    hasher.update(key.as_bytes());
                    hasher.update([0u8]);
                }
                let digest = hex::encode(hasher.finalize());
                format!("static:{}", &digest[..12])
            }
            Self::TimeWindow(def) => {
                let cadence = match &def.cadence {
                    Cadence::Hourly => "hourly".to_string(),
                    Cadence::Daily => "daily".to_string(),
                    Cadence::Cron { expression } => format!("cron[{expression}]"),
                };
                format!(
                    "{cadence}@{}@{}",
                    def.start.to_rfc3339(),
                    def.timezone.as_deref().unwrap_or("UTC")
                )
            }
            Self::MultiDimensional { dimensions } => {
                let dims: Vec<String> = dimensions
                    .iter()
                    .map(|d| format!("{}:{}", d.name, d.definition.family_fingerprint()))
                    .collect();
                format!("multi({})", dims.join(","))
            }
            Self::Dynamic { name } => format!("dynamic:{name}"),
        }
    }

    /// Human-readable description for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Static { keys } => format!("static partitions ({} keys)", keys.len()),
            Self::TimeWindow(def) => def.to_string(),
            Self::MultiDimensional { dimensions } => {
                format!("multi-dimensional partitions ({} dimensions)", dimensions.len())
            }
            Self::Dynamic { name } => format!("dynamic partitions '{name}'"),
        }
    }
}
