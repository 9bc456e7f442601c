//! Experiment catalog: the sorted, filtered view of runs in storage.
//!
//! A listing narrows the storage scan with the filter's literal prefix, runs
//! a flat scan, applies the glob filter to experiment paths, optionally keeps
//! only the newest run per experiment, sorts newest first and truncates to
//! the requested limit.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{normalize_root, ExperimentPath, ExperimentRun};

use super::error::Result;
use super::filter::FilterPatterns;
use super::scanner::PrefixScanner;

/// Default number of entries shown by a listing
pub const DEFAULT_LIMIT: usize = 50;

/// Parameters of a catalog listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Root prefix the experiment paths are relative to
    pub root_prefix: String,

    /// Raw glob filter on experiment paths
    pub filter: Option<String>,

    /// Keep only the newest run of each experiment
    pub latest_only: bool,

    /// Maximum entries returned; 0 means unlimited
    pub limit: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            root_prefix: String::new(),
            filter: None,
            latest_only: false,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub run: ExperimentRun,

    /// Runs of this experiment that matched, before any `latest_only` reduction
    pub run_count: usize,
}

impl CatalogEntry {
    pub fn has_multiple_runs(&self) -> bool {
        self.run_count > 1
    }
}

/// Result of a catalog listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogListing {
    /// Normalized root prefix (empty or ending in `/`)
    pub root_prefix: String,

    pub entries: Vec<CatalogEntry>,

    /// Entries available before truncation
    pub total: usize,
}

impl CatalogListing {
    /// True if `limit` cut the listing short
    pub fn is_truncated(&self) -> bool {
        self.total > self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Catalog over a storage namespace
#[derive(Clone)]
pub struct ExperimentCatalog {
    scanner: PrefixScanner,
}

impl ExperimentCatalog {
    pub fn new(scanner: PrefixScanner) -> Self {
        Self { scanner }
    }

    /// List (experiment, run) pairs matching `query`
    #[instrument(skip(self), fields(root = %query.root_prefix))]
    pub async fn list(&self, query: &CatalogQuery) -> Result<CatalogListing> {
        let root_prefix = normalize_root(&query.root_prefix);
        let filter = FilterPatterns::from_optional(query.filter.as_deref())?;
        let scan_prefix = filter.as_ref().map(|f| f.scan_prefix()).unwrap_or_default();

        debug!(%scan_prefix, "Scanning for experiment runs");
        let runs = self
            .scanner
            .list_experiment_runs(&root_prefix, &scan_prefix)
            .await?;

        let (entries, total) = assemble(runs, filter.as_ref(), query.latest_only, query.limit);
        debug!(total, shown = entries.len(), "Catalog listing assembled");

        Ok(CatalogListing {
            root_prefix,
            entries,
            total,
        })
    }
}

/// Filter, reduce, sort and truncate scanned runs.
///
/// Returns the entries kept and the count before truncation.
pub fn assemble(
    runs: Vec<ExperimentRun>,
    filter: Option<&FilterPatterns>,
    latest_only: bool,
    limit: usize,
) -> (Vec<CatalogEntry>, usize) {
    let runs: Vec<ExperimentRun> = match filter {
        Some(filter) => runs
            .into_iter()
            .filter(|run| filter.matches(run.experiment.as_str()))
            .collect(),
        None => runs,
    };

    let mut run_counts: HashMap<ExperimentPath, usize> = HashMap::new();
    for run in &runs {
        *run_counts.entry(run.experiment.clone()).or_default() += 1;
    }

    let runs = if latest_only { latest_per_experiment(runs) } else { runs };

    let mut entries: Vec<CatalogEntry> = runs
        .into_iter()
        .map(|run| {
            let run_count = run_counts.get(&run.experiment).copied().unwrap_or(1);
            CatalogEntry { run, run_count }
        })
        .collect();
    sort_newest_first(&mut entries);

    let total = entries.len();
    if limit > 0 {
        entries.truncate(limit);
    }

    (entries, total)
}

/// Keep the run with the highest identifier for each experiment
pub fn latest_per_experiment(runs: Vec<ExperimentRun>) -> Vec<ExperimentRun> {
    let mut latest: HashMap<ExperimentPath, ExperimentRun> = HashMap::new();
    for run in runs {
        match latest.get(&run.experiment) {
            Some(existing) if existing.run_id >= run.run_id => {}
            _ => {
                latest.insert(run.experiment.clone(), run);
            }
        }
    }
    latest.into_values().collect()
}

/// Newest run first; identical run ids fall back to experiment path.
fn sort_newest_first(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| {
        b.run
            .run_id
            .cmp(&a.run.run_id)
            .then_with(|| a.run.experiment.cmp(&b.run.experiment))
    });
}
