//! Console output for dry runs and ad-hoc evaluations

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use colored::Colorize;
use report_lib::report::{format_metric, format_savings, ReportRow, ReportSink};
use report_lib::{EvaluationResult, SampleDefect, UtilizationReport};
use std::collections::BTreeSet;
use tabled::{settings::Style, Table};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// JSON lines, for log shipping
    #[default]
    Json,
    /// Human-readable
    Pretty,
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a formatted savings value by sign
pub fn color_savings(value: f64) -> String {
    let formatted = format_savings(value);
    if value.round() > 0.0 {
        formatted.green().to_string()
    } else if value.round() < 0.0 {
        formatted.red().to_string()
    } else {
        formatted
    }
}

/// Print a full report
pub fn print_report(report: &UtilizationReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!("{}", "ECS Task Utilization Report".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Window:                 {} to {}",
                report.window.start.format("%Y-%m-%d %H:%M"),
                report.window.end.format("%Y-%m-%d %H:%M")
            );
            println!("Clusters:               {}", report.clusters.join(", ").cyan());
            println!("Families:               {}", report.families_enumerated);
            println!("Evaluated samples:      {}", report.evaluated);
            println!("Flagged:                {}", report.table.len());
            println!(
                "{}  {}",
                "Total Savings:".bold(),
                color_savings(report.table.total_savings()).bold()
            );
            println!();

            let rows: Vec<ReportRow> = report.rows();
            if rows.is_empty() {
                print_info("No task families outside the utilization band");
            } else {
                println!("{}", Table::new(&rows).with(Style::rounded()).to_string());
            }

            if !report.skipped.is_empty() {
                println!();
                print_warning(&format!(
                    "{} family samples skipped for incomplete or anomalous metrics",
                    report.skipped.len()
                ));
            }
        }
    }

    Ok(())
}

/// Print the outcome of evaluating a single sample
pub fn print_evaluation(
    outcome: &std::result::Result<EvaluationResult, SampleDefect>,
    format: OutputFormat,
) -> Result<()> {
    match (outcome, format) {
        (Ok(result), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        (Err(defect), OutputFormat::Json) => {
            let body = serde_json::json!({
                "excluded": true,
                "reason": defect.reason(),
                "details": defect.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        (Ok(result), OutputFormat::Table) => {
            let status = if result.flagged {
                "FLAGGED".red().bold().to_string()
            } else {
                "IN BAND".green().bold().to_string()
            };
            println!("{}:                 {}", result.task_family.bold(), status);
            println!("CPU ratio:              {}", format_metric(result.cpu_ratio));
            println!("Memory ratio:           {}", format_metric(result.mem_ratio));
            println!("CPU savings:            {}", color_savings(result.cpu_savings));
            println!("Memory savings:         {}", color_savings(result.mem_savings));
            println!("CPU+Memory savings:     {}", color_savings(result.total_savings));
        }
        (Err(defect), OutputFormat::Table) => {
            print_warning(&format!("Sample excluded from report: {}", defect));
        }
    }
    Ok(())
}

/// Report sink that prints instead of emailing
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl ReportSink for ConsoleSink {
    async fn deliver(&self, report: &UtilizationReport, recipients: &BTreeSet<String>) -> Result<()> {
        print_report(report, self.format)?;
        if !recipients.is_empty() {
            print_info(&format!(
                "Dry run: report not sent to {}",
                recipients.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_savings_keeps_value() {
        colored::control::set_override(false);
        assert_eq!(color_savings(40.2), "40");
        assert_eq!(color_savings(-12.5), "-13");
        assert_eq!(color_savings(0.3), "0");
    }
}
