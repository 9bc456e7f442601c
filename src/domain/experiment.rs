//! Experiments and their runs as they appear in the storage namespace.
//!
//! Layout: `{root_prefix}/{experiment_path}/{run_id}/{category}/{artifact}`

use std::fmt;

use serde::{Deserialize, Serialize};

use super::run_id::RunId;

/// Slash-delimited experiment path relative to the root prefix
/// (e.g. `202605/exp1`). Never empty, never ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentPath(String);

impl ExperimentPath {
    /// Build a path, stripping trailing slashes. Returns `None` if nothing is left.
    pub fn new(path: impl AsRef<str>) -> Option<Self> {
        let trimmed = path.as_ref().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One invocation of the pipeline for one experiment.
///
/// Ordering is lexicographic on (experiment, run).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub experiment: ExperimentPath,
    pub run_id: RunId,
}

impl ExperimentRun {
    pub fn new(experiment: ExperimentPath, run_id: RunId) -> Self {
        Self { experiment, run_id }
    }

    /// Key prefix of this run's artifacts under `root_prefix`, with trailing slash
    pub fn prefix(&self, root_prefix: &str) -> String {
        format!("{}{}/{}/", root_prefix, self.experiment, self.run_id)
    }

    /// `gs://` URI of this run's directory
    pub fn uri(&self, bucket: &str, root_prefix: &str) -> String {
        format!("gs://{}/{}", bucket, self.prefix(root_prefix))
    }

    /// Argument line accepted by the job submission tooling
    pub fn submit_args(&self) -> String {
        format!("--exp-id {} --run-id {}", self.experiment, self.run_id)
    }
}

/// Normalize a root prefix to either `""` or `"some/path/"`.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}
