//! Live job and workflow records.
//!
//! These are read-only projections of what the batch-job and
//! workflow-execution services report. Nothing here is ever written back.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Environment variable carrying the experiment id inside a task
pub const ENV_EXP_ID: &str = "EXP_ID";
/// Environment variable carrying the run id inside a task
pub const ENV_RUN_ID: &str = "RUN_ID";
/// Environment variable carrying the pipeline stage inside a task
pub const ENV_STAGE: &str = "STAGE";

pub const LABEL_EXP_ID: &str = "exp_id";
pub const LABEL_RUN_ID: &str = "run_id";
pub const LABEL_STAGE: &str = "stage";

const TERMINAL_JOB_STATES: &[&str] = &["SUCCEEDED", "FAILED", "CANCELLED", "DELETION_IN_PROGRESS"];
const TERMINAL_WORKFLOW_STATES: &[&str] = &["SUCCEEDED", "FAILED", "CANCELLED", "UNAVAILABLE"];

/// A batch job as reported by the job service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Fully qualified job name
    pub name: String,

    /// Job state (`QUEUED`, `SCHEDULED`, `RUNNING`, `SUCCEEDED`, ...)
    pub state: String,

    /// Task counts by task state, summed over task groups
    #[serde(default, deserialize_with = "deserialize_counts")]
    pub task_counts: BTreeMap<String, i64>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Environment variables from the task spec
    #[serde(default)]
    pub env: HashMap<String, String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Experiment id, preferring the task environment over labels
    pub fn experiment_id(&self) -> Option<&str> {
        self.lookup(ENV_EXP_ID, LABEL_EXP_ID)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.lookup(ENV_RUN_ID, LABEL_RUN_ID)
    }

    pub fn stage(&self) -> Option<&str> {
        self.lookup(ENV_STAGE, LABEL_STAGE)
    }

    pub fn is_active(&self) -> bool {
        !TERMINAL_JOB_STATES.contains(&self.state.as_str())
    }

    /// Short job name (last path component)
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn progress(&self) -> TaskProgress {
        TaskProgress::from_counts(&self.task_counts)
    }

    fn lookup(&self, env_key: &str, label_key: &str) -> Option<&str> {
        self.env
            .get(env_key)
            .or_else(|| self.labels.get(label_key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A workflow execution as reported by the workflow service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Fully qualified execution name
    pub name: String,

    /// Execution state (`ACTIVE`, `QUEUED`, `SUCCEEDED`, ...)
    pub state: String,

    /// JSON-encoded execution argument
    pub argument: Option<String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    /// Experiment id from the execution argument, falling back to labels
    pub fn experiment_id(&self) -> Option<String> {
        self.argument_field("exp_id")
            .or_else(|| self.labels.get(LABEL_EXP_ID).cloned())
            .filter(|v| !v.is_empty())
    }

    pub fn run_id(&self) -> Option<String> {
        self.argument_field("run_id")
            .or_else(|| self.labels.get(LABEL_RUN_ID).cloned())
            .filter(|v| !v.is_empty())
    }

    pub fn is_active(&self) -> bool {
        !TERMINAL_WORKFLOW_STATES.contains(&self.state.as_str())
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    fn argument_field(&self, field: &str) -> Option<String> {
        let argument = self.argument.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(argument).ok()?;
        value.get(field)?.as_str().map(str::to_string)
    }
}

/// Per-job task progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgress {
    pub succeeded: i64,
    pub failed: i64,
    pub running: i64,
    pub pending: i64,
    /// Tasks in any other state (assigned, unexecuted, ...)
    pub other: i64,
}

impl TaskProgress {
    pub fn from_counts(counts: &BTreeMap<String, i64>) -> Self {
        let mut progress = Self::default();
        for (state, &n) in counts {
            match state.as_str() {
                "SUCCEEDED" => progress.succeeded += n,
                "FAILED" => progress.failed += n,
                "RUNNING" => progress.running += n,
                "PENDING" => progress.pending += n,
                _ => progress.other += n,
            }
        }
        progress
    }

    pub fn total(&self) -> i64 {
        self.succeeded + self.failed + self.running + self.pending
    }

    pub fn completed(&self) -> i64 {
        self.succeeded + self.failed
    }

    /// Human-readable progress; never renders a `0/0` fraction.
    pub fn describe(&self, job_state: &str) -> String {
        let total = self.total();
        if total > 0 {
            let mut text = format!("{}/{}", self.completed(), total);
            if self.failed > 0 {
                text.push_str(&format!(" ({} failed)", self.failed));
            }
            return text;
        }

        if self.other > 0 {
            format!("{} scheduled", self.other)
        } else if job_state == "RUNNING" {
            "running".to_string()
        } else {
            "pending".to_string()
        }
    }
}

/// Coerce an API count that may arrive as `"3"` or `3` into an integer.
pub fn coerce_count(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Deserialize a `state -> count` map whose counts may be strings
pub fn deserialize_counts<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(state, value)| (state, coerce_count(&value)))
        .collect())
}

fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_env_takes_precedence_over_labels() {
        let job = JobRecord {
            name: "projects/p/locations/r/jobs/run-abc".to_string(),
            state: "RUNNING".to_string(),
            labels: [("exp_id".to_string(), "stale".to_string())].into_iter().collect(),
            env: [("EXP_ID".to_string(), "202605/exp1".to_string())].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(job.experiment_id(), Some("202605/exp1"));
        assert_eq!(job.short_name(), "run-abc");
    }

    #[test]
    fn test_labels_used_when_env_missing() {
        let job = JobRecord {
            labels: [
                ("exp_id".to_string(), "exp2".to_string()),
                ("stage".to_string(), "aggregate".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        assert_eq!(job.experiment_id(), Some("exp2"));
        assert_eq!(job.stage(), Some("aggregate"));
        assert_eq!(job.run_id(), None);
    }

    #[test]
    fn test_job_activity() {
        let mut job = JobRecord {
            state: "SCHEDULED".to_string(),
            ..Default::default()
        };
        assert!(job.is_active());
        job.state = "SUCCEEDED".to_string();
        assert!(!job.is_active());
    }

    #[test]
    fn test_workflow_experiment_from_argument() {
        let wf = WorkflowRecord {
            name: "projects/p/locations/r/workflows/w/executions/e1".to_string(),
            state: "ACTIVE".to_string(),
            argument: Some(r#"{"exp_id": "202605/exp1", "run_id": "20250601-120000-abc12345"}"#.to_string()),
            ..Default::default()
        };
        assert_eq!(wf.experiment_id().as_deref(), Some("202605/exp1"));
        assert_eq!(wf.run_id().as_deref(), Some("20250601-120000-abc12345"));
        assert!(wf.is_active());
    }

    #[test]
    fn test_workflow_experiment_falls_back_to_labels() {
        let wf = WorkflowRecord {
            argument: Some("not json".to_string()),
            labels: [("exp_id".to_string(), "exp3".to_string())].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(wf.experiment_id().as_deref(), Some("exp3"));
    }

    #[test]
    fn test_progress_fraction() {
        let p = TaskProgress::from_counts(&counts(&[
            ("SUCCEEDED", 7),
            ("FAILED", 1),
            ("RUNNING", 2),
            ("PENDING", 10),
        ]));
        assert_eq!(p.total(), 20);
        assert_eq!(p.completed(), 8);
        assert_eq!(p.describe("RUNNING"), "8/20 (1 failed)");
    }

    #[test]
    fn test_progress_zero_total_is_qualitative() {
        let empty = TaskProgress::default();
        assert_eq!(empty.describe("QUEUED"), "pending");
        assert_eq!(empty.describe("RUNNING"), "running");

        let assigned = TaskProgress::from_counts(&counts(&[("ASSIGNED", 4)]));
        assert_eq!(assigned.describe("SCHEDULED"), "4 scheduled");
    }

    #[test]
    fn test_counts_coerced_from_strings() {
        let json = r#"{
            "name": "jobs/j1",
            "state": "RUNNING",
            "task_counts": {"SUCCEEDED": "3", "RUNNING": 2, "PENDING": "x"}
        }"#;
        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.task_counts.get("SUCCEEDED"), Some(&3));
        assert_eq!(job.task_counts.get("RUNNING"), Some(&2));
        assert_eq!(job.task_counts.get("PENDING"), Some(&0));
        assert_eq!(job.progress().describe(&job.state), "3/5");
    }
}
