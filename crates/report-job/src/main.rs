//! ECS Utilization Report - scheduled task right-sizing job
//!
//! Invoked periodically by the workflow orchestrator. Each run scans the
//! configured ECS clusters, evaluates a week of Container Insights
//! utilization per task family and emails the families that fall outside
//! the acceptable utilization band.

mod config;
mod output;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use report_lib::fetcher::{CloudWatchMetricSource, EcsInventory};
use report_lib::report::{dedupe_recipients, ReportSink, SmtpReportSink, SmtpSettings};
use report_lib::secrets::{EnvSecretProvider, SecretsManagerProvider};
use report_lib::{
    run_with_retry, JobMetrics, MetricSample, MetricSeries, ReportJob, SavingsEvaluator,
    SecretProvider, StructuredLogger,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{parse_param, JobConfig, SecretSource};
use crate::output::{ConsoleSink, LogFormat, OutputFormat};

const JOB_NAME: &str = "ecs-utilization-report";

/// ECS task utilization and savings report
#[derive(Parser)]
#[command(name = "ecs-utilization-report")]
#[command(author, version, about = "ECS task utilization and savings report", long_about = None)]
pub struct Cli {
    /// Log line format
    #[arg(long, value_enum, default_value = "json", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the report and email it
    Run(RunArgs),

    /// Evaluate a single sample without contacting AWS
    Evaluate(EvaluateArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to a TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Cluster to scan (repeatable); scans every cluster when omitted
    #[arg(long = "cluster")]
    pub clusters: Vec<String>,

    /// Report recipient (repeatable)
    #[arg(long = "recipient")]
    pub recipients: Vec<String>,

    /// Orchestrator parameter as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Print the report instead of emailing it
    #[arg(long)]
    pub dry_run: bool,

    /// Output format for --dry-run
    #[arg(long, short, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Task family name shown in the output
    #[arg(long, default_value = "adhoc")]
    pub family: String,

    #[arg(long)]
    pub cpu_avg: f64,

    #[arg(long)]
    pub cpu_max: f64,

    #[arg(long)]
    pub cpu_reserved: f64,

    #[arg(long)]
    pub mem_avg: f64,

    #[arg(long)]
    pub mem_max: f64,

    #[arg(long)]
    pub mem_reserved: f64,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: OutputFormat,
}

impl EvaluateArgs {
    fn sample(&self) -> MetricSample {
        MetricSample::new("local", self.family.clone())
            .with(MetricSeries::CpuUtilizedAvg, self.cpu_avg)
            .with(MetricSeries::CpuUtilizedMax, self.cpu_max)
            .with(MetricSeries::CpuReservedAvg, self.cpu_reserved)
            .with(MetricSeries::MemUtilizedAvg, self.mem_avg)
            .with(MetricSeries::MemUtilizedMax, self.mem_max)
            .with(MetricSeries::MemReservedAvg, self.mem_reserved)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for report output
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn load_aws_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    loader.load().await
}

async fn build_sink(
    config: &JobConfig,
    sdk_config: &aws_config::SdkConfig,
    dry_run: bool,
    format: OutputFormat,
) -> Result<Box<dyn ReportSink>> {
    if dry_run {
        return Ok(Box::new(ConsoleSink::new(format)));
    }

    let secrets: Box<dyn SecretProvider> = match config.secret_source {
        SecretSource::Aws => {
            let provider =
                SecretsManagerProvider::new(aws_sdk_secretsmanager::Client::new(sdk_config));
            match &config.secret_prefix {
                Some(prefix) => Box::new(provider.with_prefix(prefix.clone())),
                None => Box::new(provider),
            }
        }
        SecretSource::Env => Box::new(EnvSecretProvider),
    };

    let username = secrets.get_secret(&config.smtp_username_secret).await?;
    let password = secrets.get_secret(&config.smtp_password_secret).await?;

    let sink = SmtpReportSink::new(SmtpSettings {
        host: config.smtp_host.clone(),
        port: config.smtp_port,
        username,
        password,
        sender: config.sender.clone(),
        subject: config.subject.clone(),
    })?;
    Ok(Box::new(sink))
}

async fn run(args: RunArgs) -> Result<()> {
    let params: BTreeMap<String, String> = args.params.iter().cloned().collect();
    let mut config = JobConfig::load(args.config.as_deref(), &params)?;
    config.apply_cli(&args.clusters, &args.recipients);
    config.validate(args.dry_run)?;

    let logger = StructuredLogger::new(JOB_NAME);
    info!(
        clusters = ?config.clusters,
        params = ?params,
        dry_run = args.dry_run,
        "Entering report job"
    );

    let sdk_config = load_aws_config(config.region.as_deref()).await;
    let inventory = EcsInventory::new(aws_sdk_ecs::Client::new(&sdk_config));
    let source = CloudWatchMetricSource::with_namespace(
        aws_sdk_cloudwatch::Client::new(&sdk_config),
        config.metric_namespace.clone(),
    );
    let job = ReportJob::new(Arc::new(inventory), Arc::new(source), logger.clone());

    let sink = build_sink(&config, &sdk_config, args.dry_run, args.format).await?;
    let recipients = dedupe_recipients(&config.recipients);
    let policy = config.retry_policy();

    let job = &job;
    let sink = sink.as_ref();
    let recipients = &recipients;
    let clusters = config.clusters.as_slice();
    let run_logger = &logger;

    let outcome = run_with_retry(&policy, &logger, move |attempt| async move {
        run_logger.log_run_started(attempt, clusters);
        job.run(clusters, Utc::now(), sink, recipients).await
    })
    .await;

    if let Some(path) = &config.metrics_path {
        if let Err(err) = JobMetrics::new().write_textfile(path) {
            tracing::warn!(error = %format!("{:#}", err), "Failed to write metrics textfile");
        }
    }

    let report = outcome?;
    info!(
        flagged = report.table.len(),
        skipped = report.skipped.len(),
        "Report job finished"
    );
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let outcome = SavingsEvaluator::new().classify(&args.sample());
    output::print_evaluation(&outcome, args.format)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Run(args) => run(args).await.context("Report job failed")?,
        Commands::Evaluate(args) => evaluate(args)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "ecs-utilization-report",
            "run",
            "--cluster",
            "prod",
            "--cluster",
            "staging",
            "--recipient",
            "ops@example.com",
            "--param",
            "alpha=a",
            "--dry-run",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.clusters, vec!["prod", "staging"]);
                assert_eq!(args.recipients, vec!["ops@example.com"]);
                assert_eq!(args.params, vec![("alpha".to_string(), "a".to_string())]);
                assert!(args.dry_run);
                assert!(matches!(args.format, OutputFormat::Json));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_bad_param_rejected() {
        let result = Cli::try_parse_from(["ecs-utilization-report", "run", "--param", "alpha"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_evaluate_args_build_sample() {
        let cli = Cli::try_parse_from([
            "ecs-utilization-report",
            "evaluate",
            "--family",
            "api",
            "--cpu-avg",
            "30",
            "--cpu-max",
            "55",
            "--cpu-reserved",
            "100",
            "--mem-avg",
            "256",
            "--mem-max",
            "300",
            "--mem-reserved",
            "512",
        ])
        .unwrap();

        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate command");
        };
        let result = SavingsEvaluator::new().evaluate(&args.sample()).unwrap();
        assert_eq!(result.task_family, "api");
        assert!(result.flagged);
        assert!((result.cpu_savings - 40.0).abs() < 1e-9);
    }
}
