//! Materialization and freshness policies.
//!
//! Both policies are closed tagged-variant types: the evaluator matches
//! them exhaustively, and the condition priority order stays a total order
//! over the variants. There is no open-ended subclassing seam.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How an asset reacts to upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// React immediately to upstream changes (and to being missing).
    Eager,
    /// React only when required by a freshness need.
    Lazy,
}

/// Controls when the reconciliation evaluator materializes an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMaterializePolicy {
    /// Eager or lazy reaction to upstream data.
    pub kind: PolicyKind,
    /// Per-asset cap on materializations requested within one evaluation
    /// window. Candidates beyond the cap are discarded, not requested.
    pub max_materializations_per_minute: Option<u32>,
    /// With this set, a parent update only triggers once every non-source
    /// parent has data newer than the asset's own.
    pub require_all_parents_updated: bool,
}

impl AutoMaterializePolicy {
    /// An eager policy with no rate limit.
    #[must_use]
    pub fn eager() -> Self {
        Self {
            kind: PolicyKind::Eager,
            max_materializations_per_minute: None,
            require_all_parents_updated: false,
        }
    }

    /// A lazy policy with no rate limit.
    #[must_use]
    pub fn lazy() -> Self {
        Self {
            kind: PolicyKind::Lazy,
            max_materializations_per_minute: None,
            require_all_parents_updated: false,
        }
    }

    /// Sets the per-minute materialization cap.
    #[must_use]
    pub fn with_max_materializations_per_minute(mut self, cap: u32) -> Self {
        self.max_materializations_per_minute = Some(cap);
        self
    }

    /// Requires all parents to have updated before reacting.
    #[must_use]
    pub fn requiring_all_parents_updated(mut self) -> Self {
        self.require_all_parents_updated = true;
        self
    }

    /// Returns true for eager policies.
    #[must_use]
    pub fn is_eager(&self) -> bool {
        self.kind == PolicyKind::Eager
    }
}

/// Bounds how stale an asset's data may be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    /// Maximum acceptable lag between data time and the required-by point.
    pub maximum_lag_minutes: u32,
    /// Optional cron schedule. When present, data must be fresh as of each
    /// schedule tick rather than continuously.
    pub cron_schedule: Option<String>,
}

/// Lookback bound when resolving the most recent cron tick. A schedule
/// with no tick in this window falls back to continuous-lag semantics.
const CRON_LOOKBACK_DAYS: i64 = 35;

impl FreshnessPolicy {
    /// A policy requiring data no older than `maximum_lag_minutes`.
    #[must_use]
    pub fn maximum_lag(maximum_lag_minutes: u32) -> Self {
        Self {
            maximum_lag_minutes,
            cron_schedule: None,
        }
    }

    /// Adds a cron schedule: data must be fresh as of each tick.
    #[must_use]
    pub fn with_cron_schedule(mut self, expression: impl Into<String>) -> Self {
        self.cron_schedule = Some(expression.into());
        self
    }

    /// Returns the minimum acceptable data timestamp as of `at`.
    ///
    /// Without a cron schedule this is `at - maximum_lag`. With one, it is
    /// the most recent schedule tick at or before `at`, minus the lag.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression cannot be parsed.
    pub fn required_data_time(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let lag = Duration::minutes(i64::from(self.maximum_lag_minutes));
        let Some(expression) = &self.cron_schedule else {
            return Ok(at - lag);
        };

        let schedule =
            Schedule::from_str(expression).map_err(|e| Error::InvalidCronExpression {
                expression: expression.clone(),
                message: e.to_string(),
            })?;

        let lookback = at - Duration::days(CRON_LOOKBACK_DAYS);
        let mut last_tick: Option<DateTime<Utc>> = None;
        for tick in schedule.after(&lookback) {
            if tick > at {
                break;
            }
            last_tick = Some(tick);
        }

        Ok(last_tick.unwrap_or(at) - lag)
    }
}
