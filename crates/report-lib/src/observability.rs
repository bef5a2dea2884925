//! Observability infrastructure for the report job
//!
//! Provides:
//! - Prometheus metrics (families enumerated/evaluated/skipped/flagged, run attempts, run duration)
//! - Structured JSON logging with tracing
//!
//! The job is a batch process with no HTTP listener, so metrics are
//! written in text exposition format to a file for a textfile collector.

use anyhow::{Context, Result};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::evaluator::SampleDefect;
use crate::models::EvaluationResult;

/// Histogram buckets for run duration (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<JobMetricsInner> = OnceLock::new();

struct JobMetricsInner {
    families_enumerated: IntGauge,
    samples_evaluated: IntCounter,
    families_skipped: IntCounterVec,
    families_flagged: IntGauge,
    run_attempts: IntCounter,
    run_failures: IntCounter,
    run_duration_seconds: Histogram,
}

impl JobMetricsInner {
    fn new() -> Self {
        Self {
            families_enumerated: register_int_gauge!(
                "ecs_report_families_enumerated",
                "Number of distinct task-definition families found in the last run"
            )
            .expect("Failed to register families_enumerated"),

            samples_evaluated: register_int_counter!(
                "ecs_report_samples_evaluated_total",
                "Total number of metric samples evaluated against the utilization band"
            )
            .expect("Failed to register samples_evaluated"),

            families_skipped: register_int_counter_vec!(
                "ecs_report_families_skipped_total",
                "Total number of family samples excluded for data anomalies",
                &["reason"]
            )
            .expect("Failed to register families_skipped"),

            families_flagged: register_int_gauge!(
                "ecs_report_families_flagged",
                "Number of families outside the utilization band in the last run"
            )
            .expect("Failed to register families_flagged"),

            run_attempts: register_int_counter!(
                "ecs_report_run_attempts_total",
                "Total number of job attempts, including retries"
            )
            .expect("Failed to register run_attempts"),

            run_failures: register_int_counter!(
                "ecs_report_run_failures_total",
                "Total number of failed job attempts"
            )
            .expect("Failed to register run_failures"),

            run_duration_seconds: register_histogram!(
                "ecs_report_run_duration_seconds",
                "Wall-clock duration of a job attempt",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),
        }
    }
}

/// Job metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct JobMetrics {
    _private: (),
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl JobMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(JobMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &JobMetricsInner {
        GLOBAL_METRICS.get_or_init(JobMetricsInner::new)
    }

    pub fn set_families_enumerated(&self, count: usize) {
        self.inner().families_enumerated.set(count as i64);
    }

    pub fn inc_samples_evaluated(&self) {
        self.inner().samples_evaluated.inc();
    }

    pub fn inc_families_skipped(&self, reason: &str) {
        self.inner()
            .families_skipped
            .with_label_values(&[reason])
            .inc();
    }

    pub fn set_families_flagged(&self, count: usize) {
        self.inner().families_flagged.set(count as i64);
    }

    pub fn inc_run_attempts(&self) {
        self.inner().run_attempts.inc();
    }

    pub fn inc_run_failures(&self) {
        self.inner().run_failures.inc();
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    /// Render every registered metric in text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics exposition is not UTF-8")
    }

    /// Write the exposition to `path` for a node-exporter textfile collector
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, rendered)
            .with_context(|| format!("Failed to write metrics to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
        Ok(())
    }
}

/// Structured logger for job events
///
/// Emits consistently named events so log queries can follow a run.
#[derive(Clone)]
pub struct StructuredLogger {
    job_name: String,
}

impl StructuredLogger {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn log_run_started(&self, attempt: u32, clusters: &[String]) {
        info!(
            event = "run_started",
            job = %self.job_name,
            attempt = attempt,
            clusters = ?clusters,
            "Starting utilization report run"
        );
    }

    /// Data anomalies are warnings; missing datapoints are routine for
    /// families not deployed on a cluster
    pub fn log_family_skipped(&self, cluster: &str, family: &str, defect: &SampleDefect) {
        match defect {
            SampleDefect::MissingMetric(_) => {
                tracing::debug!(
                    event = "family_skipped",
                    job = %self.job_name,
                    cluster = %cluster,
                    family = %family,
                    reason = defect.reason(),
                    details = %defect,
                    "Skipping family without complete metrics"
                );
            }
            _ => {
                warn!(
                    event = "family_skipped",
                    job = %self.job_name,
                    cluster = %cluster,
                    family = %family,
                    reason = defect.reason(),
                    details = %defect,
                    "Skipping family with anomalous metrics"
                );
            }
        }
    }

    pub fn log_family_flagged(&self, result: &EvaluationResult) {
        info!(
            event = "family_flagged",
            job = %self.job_name,
            cluster = %result.cluster,
            family = %result.task_family,
            cpu_ratio = result.cpu_ratio,
            mem_ratio = result.mem_ratio,
            cpu_savings = result.cpu_savings,
            mem_savings = result.mem_savings,
            total_savings = result.total_savings,
            "Family outside utilization band"
        );
    }

    pub fn log_report_built(&self, families: usize, evaluated: usize, skipped: usize, flagged: usize) {
        info!(
            event = "report_built",
            job = %self.job_name,
            families = families,
            evaluated = evaluated,
            skipped = skipped,
            flagged = flagged,
            "Utilization report built"
        );
    }

    pub fn log_report_delivered(&self, recipients: usize, rows: usize) {
        info!(
            event = "report_delivered",
            job = %self.job_name,
            recipients = recipients,
            rows = rows,
            "Utilization report delivered"
        );
    }

    pub fn log_run_retry(&self, attempt: u32, max_retries: u32, delay_secs: u64, error: &anyhow::Error) {
        warn!(
            event = "run_retry",
            job = %self.job_name,
            attempt = attempt,
            max_retries = max_retries,
            delay_secs = delay_secs,
            error = %format!("{:#}", error),
            "Run failed, retrying"
        );
    }

    pub fn log_run_failed(&self, attempts: u32, error: &anyhow::Error) {
        warn!(
            event = "run_failed",
            job = %self.job_name,
            attempts = attempts,
            error = %format!("{:#}", error),
            "Run failed, giving up"
        );
    }
}
