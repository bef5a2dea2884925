//! Report rows, rendering and delivery
//!
//! The report sink receives the ranked table with the fixed column set
//! and a deduplicated recipient list. Delivery is fire-and-forget from
//! the job's side: a sink error fails the run, nothing is retried here.

mod email;
mod render;

pub use email::{compose_message, SmtpReportSink, SmtpSettings};
pub use render::{escape_html, render_html, render_text};

use crate::job::UtilizationReport;
use crate::models::EvaluationResult;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use tabled::Tabled;

/// One formatted line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ReportRow {
    #[tabled(rename = "Task Name")]
    pub task_name: String,
    #[tabled(rename = "Average CPU")]
    pub average_cpu: String,
    #[tabled(rename = "Max CPU")]
    pub max_cpu: String,
    #[tabled(rename = "CPU Reserved")]
    pub cpu_reserved: String,
    #[tabled(rename = "Average Memory")]
    pub average_memory: String,
    #[tabled(rename = "Max Memory")]
    pub max_memory: String,
    #[tabled(rename = "Memory Reserved")]
    pub memory_reserved: String,
    #[tabled(rename = "CPU Savings")]
    pub cpu_savings: String,
    #[tabled(rename = "Memory Savings")]
    pub memory_savings: String,
    #[tabled(rename = "CPU+Memory Savings")]
    pub total_savings: String,
}

impl ReportRow {
    /// Format a result; `qualify_cluster` appends the cluster to the task name
    pub fn from_result(result: &EvaluationResult, qualify_cluster: bool) -> Self {
        let task_name = if qualify_cluster {
            format!("{} ({})", result.task_family, result.cluster)
        } else {
            result.task_family.clone()
        };

        Self {
            task_name,
            average_cpu: format_metric(result.cpu_utilized_avg),
            max_cpu: format_metric(result.cpu_utilized_max),
            cpu_reserved: format_metric(result.cpu_reserved_avg),
            average_memory: format_metric(result.mem_utilized_avg),
            max_memory: format_metric(result.mem_utilized_max),
            memory_reserved: format_metric(result.mem_reserved_avg),
            cpu_savings: format_savings(result.cpu_savings),
            memory_savings: format_savings(result.mem_savings),
            total_savings: format_savings(result.total_savings),
        }
    }
}

/// Metric values keep two decimals
pub fn format_metric(value: f64) -> String {
    format!("{:.2}", value)
}

/// Savings are shown in whole units, rounded half away from zero
pub fn format_savings(value: f64) -> String {
    let rounded = value.round();
    // avoid printing "-0"
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded as i64)
    }
}

/// Trim, drop blanks and deduplicate recipient addresses
pub fn dedupe_recipients<I, S>(recipients: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    recipients
        .into_iter()
        .map(|r| r.as_ref().trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

/// Destination for a finished report
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &UtilizationReport, recipients: &BTreeSet<String>) -> Result<()>;
}
