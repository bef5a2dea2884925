//! Integration tests for the report job
//!
//! These drive the full enumerate → fetch → evaluate → aggregate → deliver
//! pipeline against in-memory inventories, metric sources and sinks.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use report_lib::fetcher::{MetricQuery, MetricSource, TaskDefinitionPage, TaskInventory};
use report_lib::report::{dedupe_recipients, ReportSink};
use report_lib::{
    run_with_retry, MetricSeries, ReportJob, RetryPolicy, SavingsEvaluator, StructuredLogger,
    UtilizationBand, UtilizationReport,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Inventory with two pages of task definitions and a fixed cluster list
struct FakeInventory {
    clusters: Vec<String>,
    pages: Vec<Vec<String>>,
    fail_first_calls: AtomicU32,
}

impl FakeInventory {
    fn new(clusters: &[&str], pages: Vec<Vec<&str>>) -> Self {
        Self {
            clusters: clusters.iter().map(|c| c.to_string()).collect(),
            pages: pages
                .into_iter()
                .map(|page| {
                    page.into_iter()
                        .map(|family| {
                            format!(
                                "arn:aws:ecs:us-east-1:123456789012:task-definition/{}:1",
                                family
                            )
                        })
                        .collect()
                })
                .collect(),
            fail_first_calls: AtomicU32::new(0),
        }
    }

    fn failing_first(self, calls: u32) -> Self {
        self.fail_first_calls.store(calls, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl TaskInventory for FakeInventory {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        Ok(self
            .clusters
            .iter()
            .map(|c| format!("arn:aws:ecs:us-east-1:123456789012:cluster/{}", c))
            .collect())
    }

    async fn task_definitions(&self, next_token: Option<String>) -> Result<TaskDefinitionPage> {
        let remaining = self.fail_first_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_calls.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("ThrottlingException: Rate exceeded");
        }

        let index: usize = next_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let next = index + 1;
        Ok(TaskDefinitionPage {
            arns: self.pages[index].clone(),
            next_token: (next < self.pages.len()).then(|| next.to_string()),
        })
    }
}

/// (cpu_avg, cpu_reserved, mem_avg, mem_reserved) per (cluster, family)
#[derive(Default)]
struct FakeMetrics {
    samples: HashMap<(String, String), (f64, f64, f64, f64)>,
}

impl FakeMetrics {
    fn with(mut self, cluster: &str, family: &str, values: (f64, f64, f64, f64)) -> Self {
        self.samples
            .insert((cluster.to_string(), family.to_string()), values);
        self
    }
}

#[async_trait]
impl MetricSource for FakeMetrics {
    async fn statistic(&self, query: &MetricQuery) -> Result<Option<f64>> {
        let Some(&(cpu_avg, cpu_reserved, mem_avg, mem_reserved)) = self
            .samples
            .get(&(query.cluster.clone(), query.family.clone()))
        else {
            return Ok(None);
        };

        Ok(Some(match query.series {
            MetricSeries::CpuUtilizedAvg => cpu_avg,
            MetricSeries::CpuUtilizedMax => cpu_avg * 2.0,
            MetricSeries::CpuReservedAvg => cpu_reserved,
            MetricSeries::MemUtilizedAvg => mem_avg,
            MetricSeries::MemUtilizedMax => mem_avg * 1.2,
            MetricSeries::MemReservedAvg => mem_reserved,
        }))
    }
}

/// Sink that records deliveries and can be told to fail
#[derive(Default)]
struct RecordingSink {
    deliveries: Mutex<Vec<(Vec<String>, BTreeSet<String>)>>,
    fail: bool,
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn deliver(&self, report: &UtilizationReport, recipients: &BTreeSet<String>) -> Result<()> {
        if self.fail {
            anyhow::bail!("SMTP relay refused connection");
        }
        let names = report.rows().into_iter().map(|row| row.task_name).collect();
        self.deliveries
            .lock()
            .unwrap()
            .push((names, recipients.clone()));
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 8, 6, 0, 0).unwrap()
}

fn logger() -> StructuredLogger {
    StructuredLogger::new("report-job-test")
}

fn families(report: &UtilizationReport) -> Vec<&str> {
    report
        .table
        .iter()
        .map(|r| r.task_family.as_str())
        .collect()
}

fn standard_metrics() -> FakeMetrics {
    FakeMetrics::default()
        // cpu 0.3 -> savings 40, mem in band
        .with("prod", "api", (30.0, 100.0, 300.0, 512.0))
        // cpu 0.2 -> 60, mem 0.5 -> 0: total 60
        .with("prod", "worker", (20.0, 100.0, 256.0, 512.0))
        // in band on both axes
        .with("prod", "cron", (60.0, 100.0, 350.0, 512.0))
        // zero memory reservation
        .with("prod", "broken", (30.0, 100.0, 100.0, 0.0))
}

#[tokio::test]
async fn test_report_ranks_flagged_families() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api", "cron"], vec!["worker", "broken", "api"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());

    let report = job.build_report(&["prod".to_string()], now()).await.unwrap();

    assert_eq!(report.families_enumerated, 4);
    assert_eq!(report.evaluated, 3);
    assert_eq!(families(&report), vec!["worker", "api"]);
    assert!((report.table.rows()[0].total_savings - 60.0).abs() < 1e-9);
    assert!((report.table.rows()[1].total_savings - 40.0).abs() < 1e-9);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].family, "broken");
    assert_eq!(report.skipped[0].reason, "zero_reserved");
}

#[tokio::test]
async fn test_missing_metrics_are_skipped_not_fatal() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api", "ghost"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());

    let report = job.build_report(&["prod".to_string()], now()).await.unwrap();

    assert_eq!(families(&report), vec!["api"]);
    assert_eq!(report.skipped[0].family, "ghost");
    assert_eq!(report.skipped[0].reason, "missing_metric");
}

#[tokio::test]
async fn test_empty_cluster_list_scans_all_clusters() {
    let inventory = FakeInventory::new(&["prod", "staging"], vec![vec!["api"]]);
    let metrics = standard_metrics().with("staging", "api", (5.0, 100.0, 100.0, 512.0));
    let job = ReportJob::new(Arc::new(inventory), Arc::new(metrics), logger());

    let report = job.build_report(&[], now()).await.unwrap();

    assert_eq!(report.clusters, vec!["prod", "staging"]);
    let rows: Vec<String> = report.rows().into_iter().map(|r| r.task_name).collect();
    // staging: cpu 0.05 -> 90, mem 0.195 -> ~312; prod api -> 40
    assert_eq!(rows, vec!["api (staging)", "api (prod)"]);
}

#[tokio::test]
async fn test_requested_clusters_are_normalized() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());

    let clusters = job
        .resolve_clusters(&[
            "arn:aws:ecs:us-east-1:123456789012:cluster/prod".to_string(),
            " prod ".to_string(),
            "".to_string(),
        ])
        .await
        .unwrap();

    assert_eq!(clusters, vec!["prod"]);
}

#[tokio::test]
async fn test_blank_cluster_request_scans_all_clusters() {
    let inventory = FakeInventory::new(&["prod", "staging"], vec![vec!["api"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());

    let report = job
        .build_report(&[" ".to_string(), "".to_string()], now())
        .await
        .unwrap();

    assert_eq!(report.clusters, vec!["prod", "staging"]);
    assert_eq!(families(&report), vec!["api"]);
}

#[tokio::test]
async fn test_custom_band_changes_flagging() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api", "worker"]]);
    let evaluator = SavingsEvaluator::with_band(UtilizationBand {
        lower: 0.25,
        upper: 0.9,
    });
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger())
        .with_evaluator(evaluator);

    let report = job.build_report(&["prod".to_string()], now()).await.unwrap();

    // api (cpu 0.3) is inside the wider band; worker (cpu 0.2) is not
    assert_eq!(families(&report), vec!["worker"]);
    assert_eq!(report.band.lower, 0.25);
}

#[tokio::test]
async fn test_run_delivers_to_deduplicated_recipients() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api", "worker"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());
    let sink = RecordingSink::default();
    let recipients = dedupe_recipients(["ops@example.com", "ops@example.com", "fin@example.com"]);

    job.run(&["prod".to_string()], now(), &sink, &recipients)
        .await
        .unwrap();

    let deliveries = sink.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, vec!["worker", "api"]);
    assert_eq!(deliveries[0].1.len(), 2);
}

#[tokio::test]
async fn test_sink_failure_fails_run() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api"]]);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());
    let sink = RecordingSink {
        fail: true,
        ..Default::default()
    };

    let err = job
        .run(&["prod".to_string()], now(), &sink, &dedupe_recipients(["ops@example.com"]))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("SMTP relay refused connection"));
}

#[tokio::test(start_paused = true)]
async fn test_enumerator_failure_retries_whole_job() {
    let inventory = FakeInventory::new(&["prod"], vec![vec!["api", "worker"]]).failing_first(2);
    let job = ReportJob::new(Arc::new(inventory), Arc::new(standard_metrics()), logger());
    let sink = RecordingSink::default();
    let recipients = dedupe_recipients(["ops@example.com"]);
    let clusters = vec!["prod".to_string()];
    let policy = RetryPolicy::new(3, Duration::from_secs(30));
    let attempts = AtomicU32::new(0);

    let report = run_with_retry(&policy, &logger(), |_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        job.run(&clusters, now(), &sink, &recipients)
    })
    .await
    .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(families(&report), vec!["worker", "api"]);
    assert_eq!(sink.deliveries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let inventory = Arc::new(FakeInventory::new(&["prod"], vec![vec!["api", "worker", "cron"]]));
    let metrics = Arc::new(standard_metrics());
    let job = ReportJob::new(inventory, metrics, logger());

    let first = job.build_report(&[], now()).await.unwrap();
    let second = job.build_report(&[], now()).await.unwrap();

    assert_eq!(first.table, second.table);
    assert_eq!(first.skipped, second.skipped);
}
