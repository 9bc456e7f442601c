//! Adapter interfaces for external systems.
//!
//! Adapters provide a uniform interface over the object store that holds
//! pipeline artifacts and the services that run pipeline jobs. Production
//! implementations talk to Google Cloud over HTTP; the in-memory ones back
//! tests and offline use.

pub mod auth;
pub mod batch;
pub mod gcs;
pub mod memory;
pub mod workflows;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{JobRecord, WorkflowRecord};

pub use auth::TokenSource;
pub use batch::BatchClient;
pub use gcs::GcsStore;
pub use memory::{MemoryJobs, MemoryStore, MemoryWorkflows};
pub use workflows::WorkflowsClient;

/// One listing call against a prefix-delimited object store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix are returned
    pub prefix: String,

    /// Group keys at the next `/` into child prefixes instead of recursing
    pub delimited: bool,

    /// Continuation token from the previous page
    pub page_token: Option<String>,
}

impl ListRequest {
    pub fn delimited(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimited: true,
            page_token: None,
        }
    }

    pub fn flat(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimited: false,
            page_token: None,
        }
    }

    /// Same request, continued at `token`
    pub fn next(&self, token: String) -> Self {
        Self {
            page_token: Some(token),
            ..self.clone()
        }
    }
}

/// One page of listing results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Child prefixes ("subdirectories"), each ending with `/`. Empty for flat listings.
    pub prefixes: Vec<String>,

    /// Full object keys
    pub keys: Vec<String>,

    pub next_page_token: Option<String>,
}

/// A page of job records
#[derive(Debug, Clone, Default)]
pub struct JobPage {
    pub jobs: Vec<JobRecord>,
    pub next_page_token: Option<String>,
}

/// A page of workflow execution records
#[derive(Debug, Clone, Default)]
pub struct WorkflowPage {
    pub executions: Vec<WorkflowRecord>,
    pub next_page_token: Option<String>,
}

/// Read-only listing over a hierarchical key-value object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Bucket (or equivalent) the keys live in
    fn bucket(&self) -> &str;

    /// Fetch a single page of results
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;
}

/// Batch job service
#[async_trait]
pub trait JobBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a page of jobs. With `active_only`, terminal jobs may be
    /// filtered server-side.
    async fn list_jobs(&self, active_only: bool, page_token: Option<&str>) -> Result<JobPage>;
}

/// Workflow execution service
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a page of executions. With `active_only`, terminal executions
    /// may be filtered server-side.
    async fn list_executions(
        &self,
        active_only: bool,
        page_token: Option<&str>,
    ) -> Result<WorkflowPage>;
}
