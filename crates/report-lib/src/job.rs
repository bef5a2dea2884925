//! The utilization report job
//!
//! One run walks every (cluster, family) pair in order, fetching and
//! evaluating one sample at a time, then ranks the flagged families and
//! hands the table to a sink. Per-family data anomalies are skipped;
//! every other failure aborts the run so the caller can retry it whole.

use crate::aggregator::{aggregate, ReportTable};
use crate::evaluator::{SavingsEvaluator, UtilizationBand};
use crate::fetcher::{
    cluster_name, enumerate_families, MetricFetcher, MetricSource, MetricWindow, TaskInventory,
};
use crate::observability::{JobMetrics, StructuredLogger};
use crate::report::{ReportRow, ReportSink};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A (cluster, family) pair left out of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFamily {
    pub cluster: String,
    pub family: String,
    pub reason: String,
    pub details: String,
}

/// Result of one report run
#[derive(Debug, Clone, Serialize)]
pub struct UtilizationReport {
    pub generated_at: DateTime<Utc>,
    pub window: MetricWindow,
    pub band: UtilizationBand,
    pub clusters: Vec<String>,
    pub families_enumerated: usize,
    pub evaluated: usize,
    pub skipped: Vec<SkippedFamily>,
    pub table: ReportTable,
}

impl UtilizationReport {
    /// Formatted rows; task names carry the cluster when several were scanned
    pub fn rows(&self) -> Vec<ReportRow> {
        let qualify = self.clusters.len() > 1;
        self.table
            .iter()
            .map(|result| ReportRow::from_result(result, qualify))
            .collect()
    }
}

pub struct ReportJob {
    inventory: Arc<dyn TaskInventory>,
    fetcher: MetricFetcher,
    evaluator: SavingsEvaluator,
    metrics: JobMetrics,
    logger: StructuredLogger,
}

impl ReportJob {
    pub fn new(
        inventory: Arc<dyn TaskInventory>,
        source: Arc<dyn MetricSource>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            inventory,
            fetcher: MetricFetcher::new(source),
            evaluator: SavingsEvaluator::new(),
            metrics: JobMetrics::new(),
            logger,
        }
    }

    pub fn with_evaluator(mut self, evaluator: SavingsEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Normalize the requested clusters; an empty or blank request means every cluster
    pub async fn resolve_clusters(&self, requested: &[String]) -> Result<Vec<String>> {
        let clusters = normalize_clusters(requested);
        if !clusters.is_empty() {
            return Ok(clusters);
        }

        let all = self
            .inventory
            .list_clusters()
            .await
            .context("Failed to enumerate clusters")?;
        Ok(normalize_clusters(&all))
    }

    /// Fetch, evaluate and rank every family on the requested clusters
    pub async fn build_report(
        &self,
        requested_clusters: &[String],
        now: DateTime<Utc>,
    ) -> Result<UtilizationReport> {
        let clusters = self.resolve_clusters(requested_clusters).await?;
        if clusters.is_empty() {
            warn!("No clusters to scan");
        }

        let families = enumerate_families(self.inventory.as_ref())
            .await
            .context("Failed to enumerate task definition families")?;
        self.metrics.set_families_enumerated(families.len());
        info!(clusters = clusters.len(), families = families.len(), "Scanning task families");

        let window = MetricWindow::trailing(now);
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for cluster in &clusters {
            for family in &families {
                let sample = self.fetcher.fetch(cluster, family, window).await?;
                self.metrics.inc_samples_evaluated();

                match self.evaluator.classify(&sample) {
                    Ok(result) => {
                        if result.flagged {
                            self.logger.log_family_flagged(&result);
                        }
                        results.push(result);
                    }
                    Err(defect) => {
                        self.logger.log_family_skipped(cluster, family, &defect);
                        self.metrics.inc_families_skipped(defect.reason());
                        skipped.push(SkippedFamily {
                            cluster: cluster.clone(),
                            family: family.clone(),
                            reason: defect.reason().to_string(),
                            details: defect.to_string(),
                        });
                    }
                }
            }
        }

        let evaluated = results.len();
        let table = aggregate(results);
        self.metrics.set_families_flagged(table.len());
        self.logger
            .log_report_built(families.len(), evaluated, skipped.len(), table.len());

        Ok(UtilizationReport {
            generated_at: now,
            window,
            band: self.evaluator.band(),
            clusters,
            families_enumerated: families.len(),
            evaluated,
            skipped,
            table,
        })
    }

    /// Build the report and deliver it to `recipients` through `sink`
    pub async fn run(
        &self,
        requested_clusters: &[String],
        now: DateTime<Utc>,
        sink: &dyn ReportSink,
        recipients: &BTreeSet<String>,
    ) -> Result<UtilizationReport> {
        let started = Instant::now();
        let outcome = self.deliver(requested_clusters, now, sink, recipients).await;
        self.metrics
            .observe_run_duration(started.elapsed().as_secs_f64());
        outcome
    }

    async fn deliver(
        &self,
        requested_clusters: &[String],
        now: DateTime<Utc>,
        sink: &dyn ReportSink,
        recipients: &BTreeSet<String>,
    ) -> Result<UtilizationReport> {
        let report = self.build_report(requested_clusters, now).await?;

        sink.deliver(&report, recipients)
            .await
            .context("Failed to deliver report")?;
        self.logger
            .log_report_delivered(recipients.len(), report.table.len());

        Ok(report)
    }
}

/// Cluster names from names or ARNs, blanks dropped, first occurrence kept
fn normalize_clusters(clusters: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    clusters
        .iter()
        .map(|c| cluster_name(c.trim()).to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}
