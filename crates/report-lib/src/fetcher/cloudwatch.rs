//! CloudWatch Container Insights metric source

use super::{async_trait, MetricQuery, MetricSource};
use crate::models::Statistic;
use anyhow::{Context, Result};
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Datapoint, Dimension, Statistic as CwStatistic};
use aws_sdk_cloudwatch::Client;
use tracing::debug;

/// Namespace Container Insights publishes ECS task metrics under
pub const CONTAINER_INSIGHTS_NAMESPACE: &str = "ECS/ContainerInsights";

/// Reads statistics with `GetMetricStatistics`, dimensioned by cluster and family
pub struct CloudWatchMetricSource {
    client: Client,
    namespace: String,
}

impl CloudWatchMetricSource {
    pub fn new(client: Client) -> Self {
        Self::with_namespace(client, CONTAINER_INSIGHTS_NAMESPACE)
    }

    pub fn with_namespace(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

/// Dimensions identifying a family's series on one cluster
fn dimensions(query: &MetricQuery) -> [Dimension; 2] {
    [
        Dimension::builder()
            .name("ClusterName")
            .value(&query.cluster)
            .build(),
        Dimension::builder()
            .name("TaskDefinitionFamily")
            .value(&query.family)
            .build(),
    ]
}

fn request_statistic(statistic: Statistic) -> CwStatistic {
    match statistic {
        Statistic::Average => CwStatistic::Average,
        Statistic::Maximum => CwStatistic::Maximum,
    }
}

/// Value of the requested statistic on the first datapoint, if any
fn datapoint_value(datapoints: &[Datapoint], statistic: Statistic) -> Option<f64> {
    datapoints.first().and_then(|point| match statistic {
        Statistic::Average => point.average(),
        Statistic::Maximum => point.maximum(),
    })
}

#[async_trait]
impl MetricSource for CloudWatchMetricSource {
    async fn statistic(&self, query: &MetricQuery) -> Result<Option<f64>> {
        let [cluster, family] = dimensions(query);
        let output = self
            .client
            .get_metric_statistics()
            .namespace(&self.namespace)
            .metric_name(query.series.metric_name())
            .dimensions(cluster)
            .dimensions(family)
            .start_time(AwsDateTime::from_secs(query.window.start.timestamp()))
            .end_time(AwsDateTime::from_secs(query.window.end.timestamp()))
            .period(query.window.period_secs())
            .statistics(request_statistic(query.series.statistic()))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to read {} for {}/{}",
                    query.series, query.cluster, query.family
                )
            })?;

        // A single period spans the window, so at most one datapoint is expected
        let value = datapoint_value(output.datapoints(), query.series.statistic());

        debug!(
            cluster = %query.cluster,
            family = %query.family,
            series = %query.series,
            value = ?value,
            "Fetched CloudWatch statistic"
        );

        Ok(value)
    }
}
