//! ECS task-definition and cluster inventory

use super::{async_trait, cluster_name, TaskDefinitionPage, TaskInventory};
use anyhow::{Context, Result};
use aws_sdk_ecs::Client;
use tracing::debug;

/// Inventory backed by the ECS control-plane list APIs
pub struct EcsInventory {
    client: Client,
}

impl EcsInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskInventory for EcsInventory {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        let mut clusters = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_clusters()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list ECS clusters")?;

            clusters.extend(
                output
                    .cluster_arns()
                    .iter()
                    .map(|arn| cluster_name(arn).to_string()),
            );

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(count = clusters.len(), "Listed ECS clusters");
        Ok(clusters)
    }

    async fn task_definitions(&self, next_token: Option<String>) -> Result<TaskDefinitionPage> {
        let output = self
            .client
            .list_task_definitions()
            .set_next_token(next_token)
            .send()
            .await
            .context("Failed to list ECS task definitions")?;

        Ok(TaskDefinitionPage {
            arns: output.task_definition_arns().to_vec(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}
