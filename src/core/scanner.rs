//! Experiment discovery over a prefix-delimited object store.
//!
//! Two strategies produce the same set of (experiment, run) pairs:
//!
//! - **Flat** ([`PrefixScanner::list_experiment_runs`]): one paginated,
//!   non-delimited listing of every key under the scan prefix. Each key is
//!   split into segments and the first run-identifier segment marks the run;
//!   the segments before it are the experiment path. Costs one page sequence
//!   regardless of directory count, so it is the default.
//! - **Hierarchical** ([`PrefixScanner::scan_hierarchical`]): delimited
//!   listings, descending one directory level at a time. A directory whose
//!   children include a run identifier is an experiment and is not descended
//!   further. Depth is bounded by [`ScanLimits::max_depth`]; past the bound
//!   the scan stops descending without error.
//!
//! The two agree whenever run directories are leaves of the experiment
//! hierarchy and lie within the depth bound, which is what the pipeline
//! writes. Keys that do not contain a run identifier are ignored.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::adapters::{ListPage, ListRequest, ObjectStore};
use crate::domain::{is_run_id, normalize_root, ExperimentPath, ExperimentRun, RunId};

use super::error::{EpiflowError, Result};

/// Default recursion bound for hierarchical scans
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default ceiling on pages fetched by a single listing
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Default timeout for a single backend call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds applied to every scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Maximum directory depth below the scan prefix (hierarchical scans)
    pub max_depth: usize,

    /// Maximum pages for one listing before giving up
    pub max_pages: usize,

    /// Timeout for each listing call
    pub call_timeout: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Discovers experiment paths and run identifiers under a root prefix
#[derive(Clone)]
pub struct PrefixScanner {
    store: Arc<dyn ObjectStore>,
    limits: ScanLimits,
}

impl PrefixScanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            limits: ScanLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// All (experiment, run) pairs under `root`, narrowed to keys starting
    /// with `root + scan_prefix`, via a single flat listing. Sorted, unique.
    #[instrument(skip(self), fields(store = %self.store.name()))]
    pub async fn list_experiment_runs(
        &self,
        root: &str,
        scan_prefix: &str,
    ) -> Result<Vec<ExperimentRun>> {
        let root = normalize_root(root);
        let request = ListRequest::flat(format!("{}{}", root, scan_prefix));

        let mut runs = BTreeSet::new();
        let mut keys_seen = 0usize;
        self.for_each_page(request, |page| {
            keys_seen += page.keys.len();
            for key in &page.keys {
                if let Some(rel) = key.strip_prefix(root.as_str()) {
                    if let Some(run) = split_run_path(rel) {
                        runs.insert(run);
                    }
                }
            }
        })
        .await?;

        debug!(keys_seen, runs = runs.len(), "Flat scan complete");
        Ok(runs.into_iter().collect())
    }

    /// Same pairs as [`list_experiment_runs`](Self::list_experiment_runs),
    /// discovered by walking directories.
    #[instrument(skip(self), fields(store = %self.store.name()))]
    pub async fn scan_hierarchical(
        &self,
        root: &str,
        scan_prefix: &str,
    ) -> Result<Vec<ExperimentRun>> {
        let root = normalize_root(root);
        let mut runs = BTreeSet::new();
        let mut stack = vec![(format!("{}{}", root, scan_prefix), 0usize)];
        let mut listings = 0usize;

        while let Some((prefix, depth)) = stack.pop() {
            let mut children = Vec::new();
            self.for_each_page(ListRequest::delimited(prefix.as_str()), |page| {
                children.extend(page.prefixes)
            })
            .await?;
            listings += 1;

            let run_children: Vec<&String> = children
                .iter()
                .filter(|child| is_run_id(last_segment(child)))
                .collect();

            if !run_children.is_empty() {
                for child in run_children {
                    if let Some(run) = child.strip_prefix(root.as_str()).and_then(split_run_path) {
                        runs.insert(run);
                    }
                }
                continue;
            }

            if depth >= self.limits.max_depth {
                warn!(%prefix, max_depth = self.limits.max_depth, "Depth limit reached, not descending");
                continue;
            }

            stack.extend(children.into_iter().map(|child| (child, depth + 1)));
        }

        debug!(listings, runs = runs.len(), "Hierarchical scan complete");
        Ok(runs.into_iter().collect())
    }

    /// Experiment paths discovered by a hierarchical scan. Sorted, unique.
    pub async fn list_experiments(&self, root: &str, scan_prefix: &str) -> Result<Vec<ExperimentPath>> {
        let runs = self.scan_hierarchical(root, scan_prefix).await?;
        let experiments: BTreeSet<ExperimentPath> =
            runs.into_iter().map(|run| run.experiment).collect();
        Ok(experiments.into_iter().collect())
    }

    /// Fetch every page of `request`, handing each to `visit`.
    async fn for_each_page<F>(&self, mut request: ListRequest, mut visit: F) -> Result<()>
    where
        F: FnMut(ListPage),
    {
        let backend = self.store.name();

        for page_number in 0.. {
            if page_number >= self.limits.max_pages {
                return Err(EpiflowError::backend(
                    backend,
                    format!(
                        "listing of '{}' exceeded {} pages",
                        request.prefix, self.limits.max_pages
                    ),
                ));
            }

            let page = timeout(self.limits.call_timeout, self.store.list_page(&request))
                .await
                .map_err(|_| EpiflowError::timeout(backend, self.limits.call_timeout))?
                .map_err(|e| EpiflowError::backend(backend, format!("{:#}", e)))?;

            let next = page.next_page_token.clone();
            visit(page);

            match next {
                Some(token) => request = request.next(token),
                None => break,
            }
        }

        Ok(())
    }
}

/// Split a root-relative key or prefix at its first run-identifier segment.
///
/// `202605/exp1/20250601-120000-abc12345/outputs/x.csv` yields
/// (`202605/exp1`, `20250601-120000-abc12345`). The run segment must have
/// something after it (it is a directory) and at least one segment before it.
pub fn split_run_path(rel: &str) -> Option<ExperimentRun> {
    let segments: Vec<&str> = rel.split('/').collect();
    let idx = segments.iter().position(|s| is_run_id(s))?;
    if idx == 0 || idx + 1 >= segments.len() {
        return None;
    }

    let experiment = ExperimentPath::new(segments[..idx].join("/"))?;
    let run_id = RunId::parse(segments[idx]).ok()?;
    Some(ExperimentRun::new(experiment, run_id))
}

fn last_segment(prefix: &str) -> &str {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
