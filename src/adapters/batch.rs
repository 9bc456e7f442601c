//! Cloud Batch adapter.
//!
//! Lists jobs in one project/region and projects them into [`JobRecord`]s.
//! Task counts are summed across task groups and task environment
//! variables are flattened into a single map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::domain::records::coerce_count;
use crate::domain::JobRecord;

use super::auth::TokenSource;
use super::{JobBackend, JobPage};

const DEFAULT_ENDPOINT: &str = "https://batch.googleapis.com";

/// Server-side filter excluding finished jobs
const ACTIVE_FILTER: &str =
    r#"status.state != "SUCCEEDED" AND status.state != "FAILED" AND status.state != "DELETION_IN_PROGRESS""#;

/// Cloud Batch jobs client
pub struct BatchClient {
    project: String,
    region: String,
    endpoint: String,
    auth: Arc<TokenSource>,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListJobsResponse {
    #[serde(default)]
    jobs: Vec<BatchJob>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchJob {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    task_groups: Vec<TaskGroup>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    task_groups: HashMap<String, TaskGroupStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskGroupStatus {
    #[serde(default)]
    counts: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskGroup {
    #[serde(default)]
    task_spec: TaskSpec,
}

#[derive(Debug, Default, Deserialize)]
struct TaskSpec {
    #[serde(default)]
    environment: Environment,
}

#[derive(Debug, Default, Deserialize)]
struct Environment {
    #[serde(default)]
    variables: HashMap<String, String>,
}

impl From<BatchJob> for JobRecord {
    fn from(job: BatchJob) -> Self {
        let mut task_counts: BTreeMap<String, i64> = BTreeMap::new();
        for group in job.status.task_groups.values() {
            for (state, value) in &group.counts {
                *task_counts.entry(state.clone()).or_default() += coerce_count(value);
            }
        }

        let env = job
            .task_groups
            .into_iter()
            .flat_map(|group| group.task_spec.environment.variables)
            .collect();

        JobRecord {
            name: job.name,
            state: job.status.state,
            task_counts,
            labels: job.labels,
            env,
            created_at: job.create_time,
            updated_at: job.update_time,
        }
    }
}

impl BatchClient {
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        auth: Arc<TokenSource>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth,
            client,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/jobs",
            self.endpoint, self.project, self.region
        )
    }
}

#[async_trait]
impl JobBackend for BatchClient {
    fn name(&self) -> &str {
        "batch"
    }

    async fn list_jobs(&self, active_only: bool, page_token: Option<&str>) -> Result<JobPage> {
        let token = self.auth.token().await?;

        let mut query: Vec<(&str, &str)> = Vec::new();
        if active_only {
            query.push(("filter", ACTIVE_FILTER));
        }
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token));
        }

        debug!(project = %self.project, region = %self.region, active_only, "Listing batch jobs");

        let response = self
            .client
            .get(self.jobs_url())
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .context("Failed to list batch jobs")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Listing batch jobs failed with {}: {}", status, body.trim());
        }

        let body: ListJobsResponse = response
            .json()
            .await
            .context("Failed to parse batch jobs response")?;

        Ok(JobPage {
            jobs: body.jobs.into_iter().map(JobRecord::from).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
