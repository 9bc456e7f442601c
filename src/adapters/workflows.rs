//! Cloud Workflows executions adapter.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::domain::WorkflowRecord;

use super::auth::TokenSource;
use super::{WorkflowBackend, WorkflowPage};

const DEFAULT_ENDPOINT: &str = "https://workflowexecutions.googleapis.com";

/// Workflow executions client for a single workflow
pub struct WorkflowsClient {
    project: String,
    region: String,
    workflow: String,
    endpoint: String,
    auth: Arc<TokenSource>,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListExecutionsResponse {
    #[serde(default)]
    executions: Vec<Execution>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Execution {
    name: String,
    #[serde(default)]
    state: String,
    argument: Option<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl From<Execution> for WorkflowRecord {
    fn from(e: Execution) -> Self {
        WorkflowRecord {
            name: e.name,
            state: e.state,
            argument: e.argument,
            labels: e.labels,
            start_time: e.start_time,
            end_time: e.end_time,
        }
    }
}

impl WorkflowsClient {
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        workflow: impl Into<String>,
        auth: Arc<TokenSource>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            workflow: workflow.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth,
            client,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn executions_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/workflows/{}/executions",
            self.endpoint, self.project, self.region, self.workflow
        )
    }
}

#[async_trait]
impl WorkflowBackend for WorkflowsClient {
    fn name(&self) -> &str {
        "workflows"
    }

    async fn list_executions(
        &self,
        active_only: bool,
        page_token: Option<&str>,
    ) -> Result<WorkflowPage> {
        let token = self.auth.token().await?;

        // FULL view is required to get the execution argument
        let mut query: Vec<(&str, &str)> = vec![("view", "FULL")];
        if active_only {
            query.push(("filter", r#"state="ACTIVE" OR state="QUEUED""#));
        }
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token));
        }

        debug!(workflow = %self.workflow, active_only, "Listing workflow executions");

        let response = self
            .client
            .get(self.executions_url())
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .context("Failed to list workflow executions")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Listing executions of '{}' failed with {}: {}",
                self.workflow,
                status,
                body.trim()
            );
        }

        let body: ListExecutionsResponse = response
            .json()
            .await
            .context("Failed to parse workflow executions response")?;

        Ok(WorkflowPage {
            executions: body.executions.into_iter().map(WorkflowRecord::from).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
