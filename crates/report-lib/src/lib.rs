//! Library for the ECS task utilization report
//!
//! This crate provides the core functionality for:
//! - Enumerating task-definition families and fetching CloudWatch utilization
//! - Classifying each family against the utilization band and estimating savings
//! - Aggregating flagged families into a ranked report
//! - Rendering and delivering the report
//! - Whole-job retry, metrics and structured logging

pub mod aggregator;
pub mod evaluator;
pub mod fetcher;
pub mod job;
pub mod models;
pub mod observability;
pub mod report;
pub mod retry;
pub mod secrets;

pub use aggregator::{aggregate, ReportTable};
pub use evaluator::{SampleDefect, SavingsEvaluator, UtilizationBand};
pub use job::{ReportJob, SkippedFamily, UtilizationReport};
pub use models::*;
pub use observability::{JobMetrics, StructuredLogger};
pub use retry::{run_with_retry, RetryPolicy};
pub use secrets::{SecretError, SecretProvider};
