//! Task-family enumeration and utilization metric retrieval
//!
//! The job talks to AWS through two narrow capabilities:
//! - [`TaskInventory`]: clusters and paginated task-definition ARNs (ECS)
//! - [`MetricSource`]: a single statistic for one series over a window (CloudWatch)
//!
//! Both are injected, so tests run the whole pipeline against fakes.

mod cloudwatch;
mod ecs;


pub use cloudwatch::{CloudWatchMetricSource, CONTAINER_INSIGHTS_NAMESPACE};
pub use ecs::EcsInventory;

use crate::models::{MetricSample, MetricSeries};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub use async_trait::async_trait;

/// Length of the trailing metric window in days
pub const LOOKBACK_DAYS: i64 = 7;

/// Time range queried as a single aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MetricWindow {
    /// Window covering the `LOOKBACK_DAYS` days up to `now`
    pub fn trailing(now: DateTime<Utc>) -> Self {
        Self {
            start: now - chrono::Duration::days(LOOKBACK_DAYS),
            end: now,
        }
    }

    /// Aggregation period covering the whole window
    pub fn period_secs(&self) -> i32 {
        (self.end - self.start).num_seconds() as i32
    }
}

/// One statistic request against the metric source
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub cluster: String,
    pub family: String,
    pub series: MetricSeries,
    pub window: MetricWindow,
}

/// Source of aggregated utilization statistics
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Return the statistic for the query, or `None` when no datapoint exists
    async fn statistic(&self, query: &MetricQuery) -> Result<Option<f64>>;
}

/// One page of task-definition ARNs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDefinitionPage {
    pub arns: Vec<String>,
    pub next_token: Option<String>,
}

/// Inventory of clusters and task definitions
#[async_trait]
pub trait TaskInventory: Send + Sync {
    /// Names of every cluster in the account and region
    async fn list_clusters(&self) -> Result<Vec<String>>;

    /// Fetch one page of task-definition ARNs
    async fn task_definitions(&self, next_token: Option<String>) -> Result<TaskDefinitionPage>;
}

/// Extract the family from a task-definition ARN.
///
/// `arn:aws:ecs:us-east-1:123456789012:task-definition/billing-worker:42`
/// yields `billing-worker`.
pub fn family_from_arn(arn: &str) -> Option<&str> {
    let tail = arn.rsplit('/').next()?;
    let family = tail.split(':').next()?;
    (!family.is_empty()).then_some(family)
}

/// Extract the cluster name from a cluster ARN; plain names pass through
pub fn cluster_name(arn_or_name: &str) -> &str {
    arn_or_name.rsplit('/').next().unwrap_or(arn_or_name)
}

/// Walk every page of task definitions and collect the distinct families
pub async fn enumerate_families(inventory: &dyn TaskInventory) -> Result<BTreeSet<String>> {
    let mut families = BTreeSet::new();
    let mut next_token = None;
    let mut pages = 0usize;

    loop {
        let page = inventory.task_definitions(next_token.take()).await?;
        pages += 1;

        for arn in &page.arns {
            match family_from_arn(arn) {
                Some(family) => {
                    families.insert(family.to_string());
                }
                None => debug!(arn = %arn, "Ignoring malformed task definition ARN"),
            }
        }

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    debug!(pages, families = families.len(), "Enumerated task definition families");
    Ok(families)
}

/// Reads the six utilization series for a family
#[derive(Clone)]
pub struct MetricFetcher {
    source: Arc<dyn MetricSource>,
}

impl MetricFetcher {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }

    /// Fetch all series sequentially; absent datapoints stay `None`
    pub async fn fetch(
        &self,
        cluster: &str,
        family: &str,
        window: MetricWindow,
    ) -> Result<MetricSample> {
        let mut sample = MetricSample::new(cluster, family);

        for series in MetricSeries::ALL {
            let query = MetricQuery {
                cluster: cluster.to_string(),
                family: family.to_string(),
                series,
                window,
            };
            let value = self.source.statistic(&query).await?;
            sample.set(series, value);
        }

        Ok(sample)
    }
}
