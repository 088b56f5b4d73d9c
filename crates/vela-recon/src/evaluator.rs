//! The reconciliation evaluator: the control loop deciding which
//! (asset, partition) targets must be recomputed now.
//!
//! One evaluation is a pure function from (graph snapshot, cursor,
//! event-log snapshot, wall time) to (run requests, evaluation records, new
//! cursor). It holds no locks, performs no I/O beyond the read-only view it
//! is handed, and given identical inputs produces byte-identical requests
//! and cursor.
//!
//! ## Phases
//!
//! 1. **Auto-observe** — observable sources whose observation interval has
//!    elapsed get observation requests, grouped per code location.
//! 2. **Candidate collection** — per selected asset in topological order:
//!    unhandled roots, targets whose parents changed since the cursor, and
//!    freshness-driven pulls.
//! 3. **Condition evaluation** — a fixed priority order over a closed set
//!    of conditions; see [`ConditionKind`].
//! 4. **Grouping** — eligible targets grouped into run requests by
//!    (partition key, definition family).
//! 5. **Cursor fold** — requested and newly materialized root targets fold
//!    into the successor cursor; the storage-id watermark advances.
//!
//! Evaluations never partially apply: either a complete outcome is
//! returned, or the call fails and the harness retries from the prior
//! cursor.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::cursor::ReconciliationCursor;
use crate::error::{Error, Result};
use crate::evaluation::{
    build_evaluations, AutoMaterializeAssetEvaluation, ConditionKind, Decision,
};
use crate::graph::{AssetGraph, AssetNode};
use crate::metrics::{ReconMetrics, TimingGuard};
use crate::policy::AutoMaterializePolicy;
use crate::run_request::RunRequest;
use crate::selection::AssetSelection;
use crate::store::{EventKind, EventLogView};
use vela_core::observability::reconciliation_span;
use vela_core::{AssetKey, AssetKeyPartitionKey};

/// Location bucket for assets that declare none.
const DEFAULT_LOCATION: &str = "default";

/// Configuration threaded through [`Reconciler`] construction.
///
/// There are deliberately no process-wide toggles; every knob lives here.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Whether assets may carry their own [`AutoMaterializePolicy`]. A
    /// sensor built without support fails fast when it encounters one.
    pub per_asset_policy_support: bool,
    /// Policy applied to assets that declare none.
    pub default_policy: AutoMaterializePolicy,
    /// How soon the harness is expected to evaluate again. Freshness
    /// eligibility looks this far ahead, and freshness-driven requests are
    /// not repeated within this interval.
    pub expected_evaluation_interval_seconds: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            per_asset_policy_support: true,
            default_policy: AutoMaterializePolicy::eager(),
            expected_evaluation_interval_seconds: 60,
        }
    }
}

impl ReconcilerConfig {
    /// Disables per-asset policies: every asset uses the default policy,
    /// and an asset declaring its own is a configuration error.
    #[must_use]
    pub fn without_per_asset_policies(mut self) -> Self {
        self.per_asset_policy_support = false;
        self
    }

    /// Sets the policy applied to assets that declare none.
    #[must_use]
    pub fn with_default_policy(mut self, policy: AutoMaterializePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Sets the expected evaluation interval.
    #[must_use]
    pub fn with_expected_evaluation_interval_seconds(mut self, seconds: u32) -> Self {
        self.expected_evaluation_interval_seconds = seconds;
        self
    }
}

/// Everything one evaluation reads. Assembled by the harness from a
/// consistent snapshot.
pub struct EvaluationContext<'a> {
    /// The asset dependency graph.
    pub graph: &'a AssetGraph,
    /// The cursor produced by the previous evaluation.
    pub cursor: &'a ReconciliationCursor,
    /// Which assets this sensor instance is responsible for.
    pub selection: &'a AssetSelection,
    /// Current wall-clock time.
    pub now: DateTime<Utc>,
    /// Read-only event-log and dynamic-partitions view.
    pub view: &'a dyn EventLogView,
}

/// The complete result of one evaluation.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    /// Batch run requests, observation requests first, in deterministic
    /// order.
    pub run_requests: Vec<RunRequest>,
    /// One audit record per touched asset, sorted by key.
    pub evaluations: Vec<AutoMaterializeAssetEvaluation>,
    /// The successor cursor, reflecting every request just issued.
    pub cursor: ReconciliationCursor,
}

/// Mutable state accumulated across one evaluation.
#[derive(Debug, Default)]
struct EvalState {
    /// Asset -> partitions with any new event since the cursor.
    new_events: BTreeMap<AssetKey, BTreeSet<Option<String>>>,
    /// Asset -> partitions with new materializations since the cursor.
    new_materializations: BTreeMap<AssetKey, BTreeSet<Option<String>>>,
    /// Per-target condition decisions, for the evaluation recorder.
    trace: BTreeMap<AssetKeyPartitionKey, ConditionKind>,
    /// Targets included in run requests this evaluation.
    requested: BTreeSet<AssetKeyPartitionKey>,
    /// Asset -> partitions being materialized by this evaluation's
    /// requests. Children consult this to join the same run.
    materializing: BTreeMap<AssetKey, BTreeSet<Option<String>>>,
    /// Asset -> partitions deferred this evaluation. Children consult this
    /// to avoid materializing on top of stale inputs.
    skipped: BTreeMap<AssetKey, BTreeSet<Option<String>>>,
    /// Requested-target count per asset, for rate limiting.
    requested_counts: BTreeMap<AssetKey, u32>,
    /// Lazy assets requested on freshness grounds this evaluation.
    freshness_requested: BTreeSet<AssetKey>,
    /// Memoized per-asset freshness need.
    freshness_memo: BTreeMap<AssetKey, bool>,
    /// Count of candidate keys dropped for being outside their key space.
    dropped_invalid: usize,
}

/// The reconciliation evaluator.
///
/// Stateless between evaluations; safe to share across independent asset
/// selections.
#[derive(Debug, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
    metrics: ReconMetrics,
}

impl Reconciler {
    /// Creates an evaluator with the given configuration.
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            metrics: ReconMetrics::new(),
        }
    }

    /// Runs one evaluation.
    ///
    /// # Errors
    ///
    /// Fails on configuration errors only: a per-asset policy without
    /// policy support, or an invalid partitions definition (cron
    /// expression, timezone). Data errors are recovered locally by
    /// skipping the affected target.
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<ReconciliationOutcome> {
        let span = reconciliation_span("evaluate", ctx.graph.len());
        let _span_guard = span.enter();
        let metrics = self.metrics.clone();
        let _timer = TimingGuard::new(move |duration| {
            metrics.observe_evaluation_duration(duration);
        });

        let result = self.evaluate_inner(ctx);
        match &result {
            Ok(outcome) => {
                self.metrics.record_evaluation("completed");
                let observations = outcome
                    .run_requests
                    .iter()
                    .filter(|r| r.is_observation())
                    .count();
                self.metrics
                    .record_run_requests("observation", observations);
                self.metrics.record_run_requests(
                    "materialization",
                    outcome.run_requests.len() - observations,
                );
            }
            Err(_) => self.metrics.record_evaluation("failed"),
        }
        result
    }

    fn evaluate_inner(&self, ctx: &EvaluationContext<'_>) -> Result<ReconciliationOutcome> {
        self.check_policy_support(ctx)?;

        let records = ctx.view.records_since(ctx.cursor.latest_storage_id);
        let max_record_id = records.iter().map(|r| r.storage_id).max();

        let mut state = EvalState::default();
        for record in &records {
            state
                .new_events
                .entry(record.asset_key.clone())
                .or_default()
                .insert(record.partition_key.clone());
            if record.kind == EventKind::Materialization {
                state
                    .new_materializations
                    .entry(record.asset_key.clone())
                    .or_default()
                    .insert(record.partition_key.clone());
            }
        }

        let (observation_requests, observe_requested) = self.collect_observations(ctx);

        for key in ctx.graph.toposort() {
            if !ctx.selection.contains(key) {
                continue;
            }
            let Some(node) = ctx.graph.get(key) else {
                continue;
            };
            if node.spec().is_source {
                continue;
            }
            let policy = node
                .spec()
                .auto_materialize_policy
                .clone()
                .unwrap_or_else(|| self.config.default_policy.clone());

            let candidates = self.collect_candidates(ctx, node, &mut state)?;
            for partition in candidates {
                self.evaluate_candidate(ctx, node, &policy, partition, &mut state)?;
            }
        }

        let run_requests = self.group_requests(ctx, observation_requests, &state);
        let evaluations = build_evaluations(ctx.graph, &state.trace);
        let cursor = self.fold_cursor(ctx, max_record_id, &observe_requested, &state)?;

        self.record_decision_metrics(&state);
        debug!(
            requests = run_requests.len(),
            evaluations = evaluations.len(),
            dropped = state.dropped_invalid,
            "evaluation complete"
        );

        Ok(ReconciliationOutcome {
            run_requests,
            evaluations,
            cursor,
        })
    }

    /// Fail-fast configuration check: per-asset policies require support.
    fn check_policy_support(&self, ctx: &EvaluationContext<'_>) -> Result<()> {
        if self.config.per_asset_policy_support {
            return Ok(());
        }
        for node in ctx.graph.nodes() {
            if ctx.selection.contains(node.key())
                && node.spec().auto_materialize_policy.is_some()
            {
                return Err(Error::PolicyNotSupported {
                    asset_key: node.key().clone(),
                });
            }
        }
        Ok(())
    }

    /// Phase 1: observation requests for observable sources whose interval
    /// has elapsed, grouped per location.
    fn collect_observations(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> (Vec<RunRequest>, Vec<AssetKey>) {
        let mut due_by_location: BTreeMap<String, Vec<AssetKey>> = BTreeMap::new();
        let mut requested = Vec::new();

        for node in ctx.graph.nodes() {
            let spec = node.spec();
            if !ctx.selection.contains(node.key()) || !spec.is_observable {
                continue;
            }
            let Some(interval) = spec.auto_observe_interval_minutes else {
                continue;
            };
            let last_observed = ctx
                .view
                .latest_record(node.key(), None, Some(EventKind::Observation))
                .map(|r| r.timestamp);
            let last_requested = ctx
                .cursor
                .last_observe_request_timestamp_by_asset_key
                .get(node.key())
                .copied();
            let reference = last_observed.into_iter().chain(last_requested).max();
            let due = reference
                .map_or(true, |t| ctx.now - t >= Duration::minutes(i64::from(interval)));
            if due {
                let location = spec
                    .location
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
                due_by_location
                    .entry(location)
                    .or_default()
                    .push(node.key().clone());
                requested.push(node.key().clone());
            }
        }

        let observation_requests = due_by_location
            .into_values()
            .map(RunRequest::observation)
            .collect();
        (observation_requests, requested)
    }

    /// Phase 2: the candidate partition set for one asset, in key-space
    /// order.
    fn collect_candidates(
        &self,
        ctx: &EvaluationContext<'_>,
        node: &AssetNode,
        state: &mut EvalState,
    ) -> Result<Vec<Option<String>>> {
        let key = node.key();
        let parent_driven = node.upstream().iter().any(|p| {
            state.new_events.contains_key(p) || state.materializing.contains_key(p)
        });

        let Some(def) = &node.spec().partitions_def else {
            let target = AssetKeyPartitionKey::unpartitioned(key.clone());
            let unhandled_root = Self::is_materialization_root(ctx, node)
                && !ctx.cursor.was_root_handled(&target, None);
            let candidate =
                unhandled_root || parent_driven || self.freshness_due(ctx, key, state)?;
            return Ok(if candidate { vec![None] } else { Vec::new() });
        };

        let keyspace = def.partition_keys(ctx.now, ctx.view.as_dynamic_source())?;
        let keyset: BTreeSet<&str> = keyspace.iter().map(String::as_str).collect();
        let mut candidates: BTreeSet<String> = BTreeSet::new();

        if Self::is_materialization_root(ctx, node) {
            // Time-window roots target only the latest window; the backlog
            // of historic windows belongs to explicit backfills.
            let unhandled = |k: &String| {
                !ctx.cursor.was_root_handled(
                    &AssetKeyPartitionKey::partitioned(key.clone(), k.clone()),
                    Some(def),
                )
            };
            match def {
                crate::partitions::PartitionsDefinition::TimeWindow(_) => {
                    if let Some(last) = keyspace.last() {
                        if unhandled(last) {
                            candidates.insert(last.clone());
                        }
                    }
                }
                _ => {
                    for k in &keyspace {
                        if unhandled(k) {
                            candidates.insert(k.clone());
                        }
                    }
                }
            }
        }

        // Partitions whose parents changed since they were last
        // materialized or requested.
        for parent in node.upstream() {
            let mut changed: BTreeSet<Option<String>> = BTreeSet::new();
            if let Some(events) = state.new_events.get(parent) {
                changed.extend(events.iter().cloned());
            }
            if let Some(in_run) = state.materializing.get(parent) {
                changed.extend(in_run.iter().cloned());
            }
            if changed.is_empty() {
                continue;
            }

            let parent_def = ctx
                .graph
                .get(parent)
                .and_then(|n| n.spec().partitions_def.as_ref());
            let identity = parent_def
                .is_some_and(|pd| pd.family_fingerprint() == def.family_fingerprint());
            if identity {
                for partition in changed.iter().flatten() {
                    if keyset.contains(partition.as_str()) {
                        candidates.insert(partition.clone());
                    } else {
                        state.dropped_invalid += 1;
                        warn!(
                            asset = %key,
                            parent = %parent,
                            partition = %partition,
                            "dropping candidate outside the current partition key space"
                        );
                    }
                }
            } else if let Some(last) = keyspace.last() {
                // An unpartitioned or foreign-family parent maps onto the
                // latest window/key.
                candidates.insert(last.clone());
            }
        }

        if self.freshness_due(ctx, key, state)? {
            if let Some(last) = keyspace.last() {
                candidates.insert(last.clone());
            }
        }

        Ok(keyspace
            .iter()
            .filter(|k| candidates.contains(*k))
            .map(|k| Some(k.clone()))
            .collect())
    }

    /// Phase 3: evaluate conditions for one candidate target in priority
    /// order and record the outcome.
    fn evaluate_candidate(
        &self,
        ctx: &EvaluationContext<'_>,
        node: &AssetNode,
        policy: &AutoMaterializePolicy,
        partition: Option<String>,
        state: &mut EvalState,
    ) -> Result<()> {
        let key = node.key().clone();
        let target = AssetKeyPartitionKey {
            asset_key: key.clone(),
            partition_key: partition.clone(),
        };
        if state.requested.contains(&target) {
            return Ok(());
        }

        if let Some(forced) = ctx.view.condition_override(&target) {
            debug!(candidate = %target, condition = ?forced, "applying forced condition");
            self.apply_condition(node, policy, target, forced, state);
            return Ok(());
        }

        let own_latest = ctx.view.latest_record(
            &key,
            partition.as_deref(),
            Some(EventKind::Materialization),
        );

        // Parent health: a missing or deferred (non-source) parent blocks
        // the target. Source parents never block, but their observations
        // still count as updates.
        let mut parent_blocking = false;
        let mut any_parent_updated = false;
        let mut all_parents_updated = true;
        let mut parent_count = 0usize;

        for parent in node.upstream() {
            let Some(parent_node) = ctx.graph.get(parent) else {
                continue;
            };
            parent_count += 1;
            let parent_is_source = parent_node.spec().is_source;

            let parent_def = parent_node.spec().partitions_def.as_ref();
            let identity = match (&partition, parent_def, &node.spec().partitions_def) {
                (Some(_), Some(pd), Some(cd)) => {
                    pd.family_fingerprint() == cd.family_fingerprint()
                }
                _ => false,
            };
            let mapped: Option<&str> = if identity { partition.as_deref() } else { None };

            let in_run = state.materializing.get(parent).is_some_and(|parts| {
                if identity {
                    parts.contains(&mapped.map(ToString::to_string))
                } else {
                    !parts.is_empty()
                }
            });
            let parent_skipped = state.skipped.get(parent).is_some_and(|parts| {
                if identity {
                    parts.contains(&mapped.map(ToString::to_string))
                } else {
                    !parts.is_empty()
                }
            });
            let parent_latest = ctx.view.latest_record(parent, mapped, None);

            if !parent_is_source && (parent_skipped || (parent_latest.is_none() && !in_run)) {
                parent_blocking = true;
                break;
            }

            let updated = in_run
                || match (&own_latest, &parent_latest) {
                    (None, Some(_)) => true,
                    (Some(own), Some(latest)) => latest.storage_id > own.storage_id,
                    (_, None) => false,
                };
            any_parent_updated |= updated;
            all_parents_updated &= updated;
        }
        let has_relevant_parent = parent_count > 0;
        if !has_relevant_parent {
            all_parents_updated = false;
        }

        if parent_blocking {
            self.apply_condition(node, policy, target, ConditionKind::ParentOutdated, state);
            return Ok(());
        }

        let condition = if own_latest.is_none() {
            if policy.is_eager() {
                Some(ConditionKind::Missing)
            } else if self.freshness_due(ctx, &key, state)?
                && self.freshness_request_allowed(ctx, &key)
            {
                Some(ConditionKind::Missing)
            } else {
                None
            }
        } else {
            let parent_trigger = if policy.require_all_parents_updated {
                has_relevant_parent && all_parents_updated
            } else {
                any_parent_updated
            };
            if parent_trigger {
                if policy.is_eager() {
                    Some(ConditionKind::ParentUpdated)
                } else if self.freshness_due(ctx, &key, state)?
                    && self.freshness_request_allowed(ctx, &key)
                {
                    Some(ConditionKind::ParentUpdated)
                } else {
                    None
                }
            } else if !policy.is_eager()
                && self.freshness_due(ctx, &key, state)?
                && self.freshness_request_allowed(ctx, &key)
            {
                Some(ConditionKind::FreshnessDue)
            } else {
                None
            }
        };

        if let Some(condition) = condition {
            self.apply_condition(node, policy, target, condition, state);
        }
        Ok(())
    }

    /// Applies a fired condition: rate limiting, bookkeeping, and the
    /// decision trace.
    fn apply_condition(
        &self,
        node: &AssetNode,
        policy: &AutoMaterializePolicy,
        target: AssetKeyPartitionKey,
        condition: ConditionKind,
        state: &mut EvalState,
    ) {
        let key = node.key().clone();
        match condition.decision() {
            Decision::Materialize => {
                if let Some(cap) = policy.max_materializations_per_minute {
                    let count = state.requested_counts.get(&key).copied().unwrap_or(0);
                    if count >= cap {
                        state.trace.insert(target, ConditionKind::RateLimited);
                        return;
                    }
                }
                state.trace.insert(target.clone(), condition);
                state
                    .materializing
                    .entry(key.clone())
                    .or_default()
                    .insert(target.partition_key.clone());
                state.requested.insert(target);
                *state.requested_counts.entry(key.clone()).or_insert(0) += 1;
                if !policy.is_eager() {
                    state.freshness_requested.insert(key);
                }
            }
            Decision::Skip => {
                state
                    .skipped
                    .entry(key)
                    .or_default()
                    .insert(target.partition_key.clone());
                state.trace.insert(target, condition);
            }
            Decision::Discard => {
                state.trace.insert(target, condition);
            }
        }
    }

    /// Whether any freshness policy on the asset or its descendants
    /// requires data before the next plausible evaluation. Memoized per
    /// asset.
    fn freshness_due(
        &self,
        ctx: &EvaluationContext<'_>,
        key: &AssetKey,
        state: &mut EvalState,
    ) -> Result<bool> {
        if let Some(due) = state.freshness_memo.get(key) {
            return Ok(*due);
        }

        let horizon = ctx.now
            + Duration::seconds(i64::from(self.config.expected_evaluation_interval_seconds));
        let mut policies = Vec::new();
        if let Some(node) = ctx.graph.get(key) {
            if let Some(policy) = &node.spec().freshness_policy {
                policies.push(policy.clone());
            }
        }
        for descendant in ctx.graph.descendants(key) {
            if let Some(policy) = ctx
                .graph
                .get(&descendant)
                .and_then(|n| n.spec().freshness_policy.clone())
            {
                policies.push(policy);
            }
        }

        let due = if policies.is_empty() {
            false
        } else {
            let latest = ctx
                .view
                .latest_record(key, None, Some(EventKind::Materialization));
            let mut due = false;
            for policy in &policies {
                let required = policy.required_data_time(horizon)?;
                match &latest {
                    None => {
                        due = true;
                        break;
                    }
                    Some(record) if record.timestamp < required => {
                        due = true;
                        break;
                    }
                    Some(_) => {}
                }
            }
            due
        };

        state.freshness_memo.insert(key.clone(), due);
        Ok(due)
    }

    /// Freshness-driven requests repeat at most once per expected
    /// evaluation interval, so an in-flight run is not re-requested every
    /// tick.
    fn freshness_request_allowed(&self, ctx: &EvaluationContext<'_>, key: &AssetKey) -> bool {
        let interval =
            Duration::seconds(i64::from(self.config.expected_evaluation_interval_seconds));
        ctx.cursor
            .last_freshness_request_timestamp_by_asset_key
            .get(key)
            .map_or(true, |previous| ctx.now - *previous >= interval)
    }

    /// Phase 4: group eligible targets into run requests.
    fn group_requests(
        &self,
        ctx: &EvaluationContext<'_>,
        observation_requests: Vec<RunRequest>,
        state: &EvalState,
    ) -> Vec<RunRequest> {
        let mut groups: BTreeMap<(Option<String>, Option<String>), Vec<AssetKey>> =
            BTreeMap::new();
        for target in &state.requested {
            let family = ctx
                .graph
                .get(&target.asset_key)
                .and_then(|n| n.spec().partitions_def.as_ref())
                .map(crate::partitions::PartitionsDefinition::family_fingerprint);
            groups
                .entry((target.partition_key.clone(), family))
                .or_default()
                .push(target.asset_key.clone());
        }

        let mut run_requests = observation_requests;
        for ((partition_key, _family), assets) in groups {
            run_requests.push(RunRequest::materialization(assets, partition_key));
        }
        run_requests
    }

    /// Phase 5: build the successor cursor.
    fn fold_cursor(
        &self,
        ctx: &EvaluationContext<'_>,
        max_record_id: Option<u64>,
        observe_requested: &[AssetKey],
        state: &EvalState,
    ) -> Result<ReconciliationCursor> {
        let mut newly_handled_roots = Vec::new();
        let mut newly_handled_partitions = Vec::new();

        for node in ctx.graph.nodes() {
            let key = node.key();
            if !ctx.selection.contains(key)
                || node.spec().is_source
                || !Self::is_materialization_root(ctx, node)
            {
                continue;
            }
            match &node.spec().partitions_def {
                None => {
                    let requested_now = state
                        .requested
                        .contains(&AssetKeyPartitionKey::unpartitioned(key.clone()));
                    let materialized_since = state.new_materializations.contains_key(key);
                    if requested_now || materialized_since {
                        newly_handled_roots.push(key.clone());
                    }
                }
                Some(def) => {
                    let keyspace: BTreeSet<String> = def
                        .partition_keys(ctx.now, ctx.view.as_dynamic_source())?
                        .into_iter()
                        .collect();
                    let mut handled: BTreeSet<String> = BTreeSet::new();
                    if let Some(parts) = state.materializing.get(key) {
                        handled.extend(parts.iter().flatten().cloned());
                    }
                    if let Some(parts) = state.new_materializations.get(key) {
                        for partition in parts.iter().flatten() {
                            if keyspace.contains(partition) {
                                handled.insert(partition.clone());
                            } else {
                                warn!(
                                    asset = %key,
                                    partition = %partition,
                                    "ignoring materialization outside the current key space"
                                );
                            }
                        }
                    }
                    if !handled.is_empty() {
                        newly_handled_partitions
                            .push((key.clone(), def.subset_with_known_keys(handled)));
                    }
                }
            }
        }

        ctx.cursor.advanced(
            max_record_id,
            newly_handled_roots,
            newly_handled_partitions,
            observe_requested.iter().map(|k| (k.clone(), ctx.now)),
            state
                .freshness_requested
                .iter()
                .map(|k| (k.clone(), ctx.now)),
        )
    }

    /// A root for reconciliation purposes: no upstream, or upstream
    /// consisting entirely of source assets ("source-adjacent").
    fn is_materialization_root(ctx: &EvaluationContext<'_>, node: &AssetNode) -> bool {
        node.upstream()
            .iter()
            .all(|p| ctx.graph.get(p).map_or(true, |n| n.spec().is_source))
    }

    fn record_decision_metrics(&self, state: &EvalState) {
        let mut requested = 0;
        let mut skipped = 0;
        let mut discarded = 0;
        for condition in state.trace.values() {
            match condition.decision() {
                Decision::Materialize => requested += 1,
                Decision::Skip => skipped += 1,
                Decision::Discard => discarded += 1,
            }
        }
        self.metrics.record_candidates("requested", requested);
        self.metrics.record_candidates("skipped", skipped);
        self.metrics.record_candidates("discarded", discarded);
        self.metrics
            .record_candidates("dropped", state.dropped_invalid);
    }
}
