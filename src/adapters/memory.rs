//! In-memory backends.
//!
//! `MemoryStore` reproduces the listing semantics of a prefix-delimited
//! object store, including pagination, so that scan strategies can be
//! exercised without network access. `MemoryJobs` and `MemoryWorkflows`
//! serve fixed record sets.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::domain::{JobRecord, WorkflowRecord};

use super::{JobBackend, JobPage, ListPage, ListRequest, ObjectStore, WorkflowBackend, WorkflowPage};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object store holding only keys
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: String,
    keys: BTreeSet<String>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            keys: BTreeSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Build a store from a set of keys
    pub fn with_keys<I, S>(bucket: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new(bucket);
        store.keys.extend(keys.into_iter().map(Into::into));
        store
    }

    /// Limit the number of entries per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Listing entry before pagination
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Entry {
    Prefix(String),
    Key(String),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Prefix(s) | Entry::Key(s) => s,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let prefix = request.prefix.as_str();

        let mut entries: BTreeSet<Entry> = BTreeSet::new();
        for key in self.keys.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            match rest.find('/') {
                Some(idx) if request.delimited => {
                    entries.insert(Entry::Prefix(format!("{}{}", prefix, &rest[..=idx])));
                }
                _ => {
                    entries.insert(Entry::Key(key.clone()));
                }
            }
        }

        let mut entries: Vec<Entry> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));

        let start = match request.page_token {
            Some(ref token) => token
                .parse::<usize>()
                .with_context(|| format!("Invalid page token: {}", token))?,
            None => 0,
        };
        let end = (start + self.page_size).min(entries.len());

        let mut page = ListPage::default();
        for entry in entries.get(start..end).unwrap_or_default() {
            match entry {
                Entry::Prefix(p) => page.prefixes.push(p.clone()),
                Entry::Key(k) => page.keys.push(k.clone()),
            }
        }
        if end < entries.len() {
            page.next_page_token = Some(end.to_string());
        }

        Ok(page)
    }
}

/// A fixed set of jobs
#[derive(Debug, Clone, Default)]
pub struct MemoryJobs {
    jobs: Vec<JobRecord>,
    page_size: usize,
}

impl MemoryJobs {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self {
            jobs,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl JobBackend for MemoryJobs {
    fn name(&self) -> &str {
        "memory-jobs"
    }

    async fn list_jobs(&self, active_only: bool, page_token: Option<&str>) -> Result<JobPage> {
        let selected: Vec<&JobRecord> = self
            .jobs
            .iter()
            .filter(|job| !active_only || job.is_active())
            .collect();
        let (items, next_page_token) = paginate(&selected, self.page_size, page_token)?;

        Ok(JobPage {
            jobs: items.into_iter().cloned().collect(),
            next_page_token,
        })
    }
}

/// A fixed set of workflow executions
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkflows {
    executions: Vec<WorkflowRecord>,
    page_size: usize,
}

impl MemoryWorkflows {
    pub fn new(executions: Vec<WorkflowRecord>) -> Self {
        Self {
            executions,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl WorkflowBackend for MemoryWorkflows {
    fn name(&self) -> &str {
        "memory-workflows"
    }

    async fn list_executions(
        &self,
        active_only: bool,
        page_token: Option<&str>,
    ) -> Result<WorkflowPage> {
        let selected: Vec<&WorkflowRecord> = self
            .executions
            .iter()
            .filter(|wf| !active_only || wf.is_active())
            .collect();
        let (items, next_page_token) = paginate(&selected, self.page_size, page_token)?;

        Ok(WorkflowPage {
            executions: items.into_iter().cloned().collect(),
            next_page_token,
        })
    }
}

fn paginate<'a, T>(
    items: &[&'a T],
    page_size: usize,
    page_token: Option<&str>,
) -> Result<(Vec<&'a T>, Option<String>)> {
    let start = match page_token {
        Some(token) => token
            .parse::<usize>()
            .with_context(|| format!("Invalid page token: {}", token))?,
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let next = (end < items.len()).then(|| end.to_string());
    Ok((page, next))
}
