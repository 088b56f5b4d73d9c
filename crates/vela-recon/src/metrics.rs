//! Observability metrics for the reconciliation engine.
//!
//! Metrics are exported via the `metrics` crate facade and are designed to
//! support:
//!
//! - **Alerting**: SLO-based alerts on evaluation latency and failure rates
//! - **Dashboards**: Real-time visibility into reconciliation throughput
//! - **Debugging**: Correlating decision counts with traces
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `vela_recon_evaluations_total` | Counter | `status` | Evaluation outcomes |
//! | `vela_recon_evaluation_duration_seconds` | Histogram | - | Full evaluation wall time |
//! | `vela_recon_run_requests_total` | Counter | `trigger` | Run requests by trigger kind |
//! | `vela_recon_candidates_total` | Counter | `decision` | Candidate decisions |
//!
//! ## Integration
//!
//! To export to Prometheus, install a recorder at process startup:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Evaluation outcomes by status.
    pub const EVALUATIONS_TOTAL: &str = "vela_recon_evaluations_total";
    /// Histogram: Full evaluation wall time in seconds.
    pub const EVALUATION_DURATION_SECONDS: &str = "vela_recon_evaluation_duration_seconds";
    /// Counter: Run requests by trigger kind.
    pub const RUN_REQUESTS_TOTAL: &str = "vela_recon_run_requests_total";
    /// Counter: Candidate decisions by outcome.
    pub const CANDIDATES_TOTAL: &str = "vela_recon_candidates_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Outcome status (completed, failed).
    pub const STATUS: &str = "status";
    /// Trigger kind (materialization, observation).
    pub const TRIGGER: &str = "trigger";
    /// Candidate decision (requested, skipped, discarded, dropped).
    pub const DECISION: &str = "decision";
}

/// High-level interface for recording reconciliation metrics.
///
/// Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct ReconMetrics {
    _private: (),
}

impl ReconMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one evaluation.
    pub fn record_evaluation(&self, status: &str) {
        counter!(
            names::EVALUATIONS_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records emitted run requests.
    pub fn record_run_requests(&self, trigger: &str, count: usize) {
        counter!(
            names::RUN_REQUESTS_TOTAL,
            labels::TRIGGER => trigger.to_string(),
        )
        .increment(count as u64);
    }

    /// Records candidate decisions.
    pub fn record_candidates(&self, decision: &str, count: usize) {
        counter!(
            names::CANDIDATES_TOTAL,
            labels::DECISION => decision.to_string(),
        )
        .increment(count as u64);
    }

    /// Records full evaluation duration.
    pub fn observe_evaluation_duration(&self, duration: Duration) {
        histogram!(names::EVALUATION_DURATION_SECONDS).record(duration.as_secs_f64());
    }
}

/// RAII guard that measures elapsed time and reports it on drop.
///
/// ## Example
///
/// ```rust,no_run
/// use vela_recon::metrics::{ReconMetrics, TimingGuard};
///
/// let metrics = ReconMetrics::new();
///
/// {
///     let _guard = TimingGuard::new(|duration| {
///         metrics.observe_evaluation_duration(duration);
///     });
///
///     // Do work...
/// } // Duration recorded automatically on drop
/// ```
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn timing_guard_fires_on_drop() {
        let fired = AtomicBool::new(false);
        {
            let _guard = TimingGuard::new(|_| {
                fired.store(true, Ordering::SeqCst);
            });
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn record_helpers_do_not_panic_without_recorder() {
        let metrics = ReconMetrics::new();
        metrics.record_evaluation("completed");
        metrics.record_run_requests("materialization", 2);
        metrics.record_candidates("requested", 5);
        metrics.observe_evaluation_duration(Duration::from_millis(3));
    }
}
