//! Live status across the workflow and batch-job services.
//!
//! Each backend is queried independently and best-effort: a failure on one
//! side is recorded and the other side's records are still returned. Both
//! queries page until exhausted, since an undercount of active work is a
//! wrong answer rather than a cosmetic one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::adapters::{JobBackend, WorkflowBackend};
use crate::domain::{JobRecord, WorkflowRecord};

use super::error::{EpiflowError, Result};
use super::scanner::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_PAGES};

/// What to include in a status query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusQuery {
    /// Only records belonging to this experiment
    pub exp_id: Option<String>,

    /// Also include records that finished within this window
    pub recent: Option<chrono::Duration>,
}

/// Records gathered by one poll
#[derive(Debug, Clone)]
pub struct ActiveStatus {
    pub workflows: Vec<WorkflowRecord>,
    pub jobs: Vec<JobRecord>,

    /// Backends that could not be queried this poll
    pub failures: Vec<EpiflowError>,

    pub fetched_at: DateTime<Utc>,
}

/// Backends queried by each poll
const BACKEND_COUNT: usize = 2;

impl ActiveStatus {
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty() && self.jobs.is_empty()
    }

    /// First failure, if every backend failed. With at least one backend
    /// answering, the poll is a partial view rather than an error.
    pub fn total_failure(&self) -> Option<&EpiflowError> {
        if self.failures.len() >= BACKEND_COUNT {
            self.failures.first()
        } else {
            None
        }
    }
}

/// Joins workflow executions and batch jobs into one view
#[derive(Clone)]
pub struct StatusAggregator {
    workflows: Arc<dyn WorkflowBackend>,
    jobs: Arc<dyn JobBackend>,
    call_timeout: Duration,
    max_pages: usize,
}

impl StatusAggregator {
    pub fn new(workflows: Arc<dyn WorkflowBackend>, jobs: Arc<dyn JobBackend>) -> Self {
        Self {
            workflows,
            jobs,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Poll both backends now
    pub async fn fetch_active(&self, query: &StatusQuery) -> ActiveStatus {
        self.fetch_active_at(query, Utc::now()).await
    }

    /// Poll both backends, judging `recent` relative to `now`
    #[instrument(skip(self, now))]
    pub async fn fetch_active_at(&self, query: &StatusQuery, now: DateTime<Utc>) -> ActiveStatus {
        let active_only = query.recent.is_none();
        let cutoff = query.recent.map(|window| now - window);

        let (workflows, jobs) = tokio::join!(
            self.fetch_workflows(active_only),
            self.fetch_jobs(active_only)
        );

        let mut failures = Vec::new();

        let mut workflows: Vec<WorkflowRecord> = match workflows {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Workflow query failed");
                failures.push(e);
                Vec::new()
            }
        };
        let mut jobs: Vec<JobRecord> = match jobs {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Job query failed");
                failures.push(e);
                Vec::new()
            }
        };

        workflows.retain(|wf| {
            (wf.is_active() || finished_since(wf.end_time, cutoff))
                && matches_experiment(wf.experiment_id().as_deref(), query)
        });
        jobs.retain(|job| {
            (job.is_active() || finished_since(job.updated_at, cutoff))
                && matches_experiment(job.experiment_id(), query)
        });

        workflows.sort_by(|a, b| {
            a.experiment_id()
                .unwrap_or_default()
                .cmp(&b.experiment_id().unwrap_or_default())
                .then_with(|| a.name.cmp(&b.name))
        });
        jobs.sort_by(|a, b| {
            a.experiment_id()
                .unwrap_or_default()
                .cmp(&b.experiment_id().unwrap_or_default())
                .then_with(|| a.name.cmp(&b.name))
        });

        debug!(
            workflows = workflows.len(),
            jobs = jobs.len(),
            failures = failures.len(),
            "Status poll complete"
        );

        ActiveStatus {
            workflows,
            jobs,
            failures,
            fetched_at: now,
        }
    }

    async fn fetch_workflows(&self, active_only: bool) -> Result<Vec<WorkflowRecord>> {
        let backend = self.workflows.name();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = timeout(
                self.call_timeout,
                self.workflows.list_executions(active_only, page_token.as_deref()),
            )
            .await
            .map_err(|_| EpiflowError::timeout(backend, self.call_timeout))?
            .map_err(|e| EpiflowError::backend(backend, format!("{:#}", e)))?;

            records.extend(page.executions);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(records),
            }
        }

        Err(EpiflowError::backend(
            backend,
            format!("execution listing exceeded {} pages", self.max_pages),
        ))
    }

    async fn fetch_jobs(&self, active_only: bool) -> Result<Vec<JobRecord>> {
        let backend = self.jobs.name();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = timeout(
                self.call_timeout,
                self.jobs.list_jobs(active_only, page_token.as_deref()),
            )
            .await
            .map_err(|_| EpiflowError::timeout(backend, self.call_timeout))?
            .map_err(|e| EpiflowError::backend(backend, format!("{:#}", e)))?;

            records.extend(page.jobs);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(records),
            }
        }

        Err(EpiflowError::backend(
            backend,
            format!("job listing exceeded {} pages", self.max_pages),
        ))
    }
}

fn finished_since(finished_at: Option<DateTime<Utc>>, cutoff: Option<DateTime<Utc>>) -> bool {
    match (finished_at, cutoff) {
        (Some(at), Some(cutoff)) => at >= cutoff,
        _ => false,
    }
}

fn matches_experiment(exp_id: Option<&str>, query: &StatusQuery) -> bool {
    match query.exp_id.as_deref() {
        Some(wanted) => exp_id == Some(wanted),
        None => true,
    }
}

/// Parse a window such as `30m`, `2h`, `1d` or `45s` (bare numbers are seconds)
pub fn parse_window(s: &str) -> std::result::Result<chrono::Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let n: i64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}': expected e.g. 30m, 2h, 1d", s))?;

    match unit {
        "" | "s" => Ok(chrono::Duration::seconds(n)),
        "m" => Ok(chrono::Duration::minutes(n)),
        "h" => Ok(chrono::Duration::hours(n)),
        "d" => Ok(chrono::Duration::days(n)),
        other => Err(format!("invalid duration unit '{}' in '{}'", other, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryJobs, MemoryWorkflows};
    use chrono::TimeZone;

    fn job(name: &str, state: &str, exp: &str) -> JobRecord {
        JobRecord {
            name: name.to_string(),
            state: state.to_string(),
            env: [("EXP_ID".to_string(), exp.to_string())].into_iter().collect(),
            ..Default::default()
        }
    }

    fn workflow(name: &str, state: &str, exp: &str) -> WorkflowRecord {
        WorkflowRecord {
            name: name.to_string(),
            state: state.to_string(),
            argument: Some(format!(r#"{{"exp_id": "{}"}}"#, exp)),
            ..Default::default()
        }
    }

    fn poll(failures: Vec<EpiflowError>) -> ActiveStatus {
        ActiveStatus {
            workflows: Vec::new(),
            jobs: vec![job("j1", "RUNNING", "e1")],
            failures,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_failure_needs_every_backend_down() {
        assert!(poll(Vec::new()).total_failure().is_none());

        let partial = poll(vec![EpiflowError::backend("workflows", "403")]);
        assert!(partial.total_failure().is_none());

        let down = poll(vec![
            EpiflowError::backend("workflows", "403"),
            EpiflowError::backend("batch", "timed out"),
        ]);
        let err = down.total_failure().unwrap();
        assert_eq!(err, &EpiflowError::backend("workflows", "403"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("30m").unwrap(), chrono::Duration::minutes(30));
        assert_eq!(parse_window("2h").unwrap(), chrono::Duration::hours(2));
        assert_eq!(parse_window("1d").unwrap(), chrono::Duration::days(1));
        assert_eq!(parse_window("90").unwrap(), chrono::Duration::seconds(90));
        assert!(parse_window("h").is_err());
        assert!(parse_window("3w").is_err());
    }

    #[tokio::test]
    async fn test_workflow_pages_are_exhausted_and_sorted() {
        let workflows = MemoryWorkflows::new(vec![
            workflow("w1", "ACTIVE", "zeta"),
            workflow("w2", "ACTIVE", "alpha"),
            workflow("w3", "ACTIVE", "mid"),
            workflow("w4", "SUCCEEDED", "alpha"),
        ])
        .with_page_size(1);
        let aggregator = StatusAggregator::new(Arc::new(workflows), Arc::new(MemoryJobs::default()));

        let status = aggregator.fetch_active(&StatusQuery::default()).await;
        let exps: Vec<String> = status
            .workflows
            .iter()
            .filter_map(|w| w.experiment_id())
            .collect();
        assert_eq!(exps, vec!["alpha", "mid", "zeta"]);
        assert!(status.failures.is_empty());
    }

    #[tokio::test]
    async fn test_exp_id_filter() {
        let jobs = MemoryJobs::new(vec![
            job("j1", "RUNNING", "202605/exp1"),
            job("j2", "RUNNING", "202605/exp2"),
        ]);
        let aggregator = StatusAggregator::new(Arc::new(MemoryWorkflows::default()), Arc::new(jobs));

        let query = StatusQuery {
            exp_id: Some("202605/exp2".to_string()),
            ..Default::default()
        };
        let status = aggregator.fetch_active(&query).await;
        assert_eq!(status.jobs.len(), 1);
        assert_eq!(status.jobs[0].name, "j2");
    }

    #[tokio::test]
    async fn test_recent_includes_newly_finished() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let mut finished_recently = job("recent", "SUCCEEDED", "e1");
        finished_recently.updated_at = Some(now - chrono::Duration::minutes(10));
        let mut finished_long_ago = job("old", "FAILED", "e2");
        finished_long_ago.updated_at = Some(now - chrono::Duration::hours(5));
        let running = job("live", "RUNNING", "e3");

        let aggregator = StatusAggregator::new(
            Arc::new(MemoryWorkflows::default()),
            Arc::new(MemoryJobs::new(vec![finished_recently, finished_long_ago, running])),
        );

        let query = StatusQuery {
            recent: Some(chrono::Duration::hours(1)),
            ..Default::default()
        };
        let status = aggregator.fetch_active_at(&query, now).await;
        let names: Vec<&str> = status.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["recent", "live"]);

        let status = aggregator.fetch_active_at(&StatusQuery::default(), now).await;
        assert_eq!(status.jobs.len(), 1);
    }
}
