//! epiflow - Experiment discovery and status for batch simulation pipelines
//!
//! Simulation pipelines run in three stages (build inputs, run parallel
//! tasks, aggregate outputs) as batch jobs driven by a workflow engine.
//! Every run writes its artifacts under
//! `{root}/{experiment_path}/{run_id}/{category}/{artifact}` in a storage
//! bucket. This crate finds those experiments and runs again, and joins
//! them with what the job and workflow services are doing right now.
//!
//! # Modules
//!
//! - `adapters`: Object store, batch and workflow backends (GCP + in-memory)
//! - `core`: Scanning, filtering, catalog listing and status aggregation
//! - `domain`: Data structures (RunId, ExperimentPath, JobRecord, ...)
//! - `config`: Layered YAML/env/flag configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Newest run of every experiment under 202605/
//! epiflow list 202605/ --latest
//!
//! # Resubmit the aggregate stage for matching runs
//! epiflow list 'test/exp*' --format args | xargs -L1 submit-aggregate
//!
//! # Watch running work for one experiment
//! epiflow status --exp-id 202605/exp1 --watch
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{
    CatalogListing, CatalogQuery, EpiflowError, ExperimentCatalog, FilterPatterns, PrefixScanner,
    StatusAggregator, StatusQuery,
};
pub use domain::{ExperimentPath, ExperimentRun, JobRecord, RunId, WorkflowRecord};
