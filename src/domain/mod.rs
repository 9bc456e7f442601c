//! Domain types for epiflow.
//!
//! This module contains the core data structures:
//! - RunId: Fixed-format run identifiers
//! - Experiment: Experiment paths and (experiment, run) pairs
//! - Records: Live job and workflow records

pub mod experiment;
pub mod records;
pub mod run_id;

// Re-export commonly used types
pub use experiment::{normalize_root, ExperimentPath, ExperimentRun};
pub use records::{JobRecord, TaskProgress, WorkflowRecord};
pub use run_id::{is_run_id, IdentifierError, RunId};
