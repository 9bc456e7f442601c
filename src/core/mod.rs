//! Core discovery and status logic.
//!
//! This module contains:
//! - Scanner: Flat and hierarchical enumeration of the storage namespace
//! - Filter: Glob filter expansion and scan-prefix derivation
//! - Catalog: Sorted, filtered, limited experiment/run listings
//! - Status: Live workflow and job status aggregation

pub mod catalog;
pub mod error;
pub mod filter;
pub mod scanner;
pub mod status;

// Re-export commonly used types
pub use catalog::{CatalogEntry, CatalogListing, CatalogQuery, ExperimentCatalog};
pub use error::EpiflowError;
pub use filter::{extract_scan_prefix, normalize_filter_patterns, FilterPatterns};
pub use scanner::{PrefixScanner, ScanLimits};
pub use status::{ActiveStatus, StatusAggregator, StatusQuery};
