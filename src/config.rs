//! Configuration for epiflow.
//!
//! Configuration layers (highest priority first):
//! 1. Command-line flags
//! 2. Environment variables (EPIFLOW_BUCKET, EPIFLOW_DIR_PREFIX, ...)
//! 3. Explicit config file (`--config <file>`)
//! 4. Project config file (.epiflow/config.yaml in the current directory or a parent)
//! 5. User config file ($XDG_CONFIG_HOME/epiflow/config.yaml)
//! 6. Defaults
//!
//! Each layer is a [`ConfigLayer`] with every field optional. Layers are
//! combined with [`ConfigLayer::merge`], which returns a new value, and the
//! result is frozen into a [`ResolvedConfig`]. Required settings that are
//! still missing surface as configuration errors when a command needs them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::core::error::{EpiflowError, Result};
use crate::core::scanner::{ScanLimits, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PAGES};
use crate::domain::normalize_root;

/// Environment variable prefix
const ENV_PREFIX: &str = "EPIFLOW_";

/// One configuration layer (matches the YAML structure)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    /// Storage bucket holding pipeline artifacts
    pub bucket: Option<String>,
    /// Root prefix inside the bucket (e.g. `pipeline/flu`)
    pub dir_prefix: Option<String>,
    /// Cloud project running jobs and workflows
    pub project: Option<String>,
    pub region: Option<String>,
    /// Workflow whose executions drive the pipeline
    pub workflow: Option<String>,
    /// Timeout for each backend call
    pub timeout_seconds: Option<u64>,
    /// Page ceiling for a single listing
    pub max_pages: Option<usize>,
    /// Depth bound for hierarchical scans
    pub max_depth: Option<usize>,
}

impl ConfigLayer {
    /// Overlay `over` on top of `self`; fields set in `over` win.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            bucket: over.bucket.or(self.bucket),
            dir_prefix: over.dir_prefix.or(self.dir_prefix),
            project: over.project.or(self.project),
            region: over.region.or(self.region),
            workflow: over.workflow.or(self.workflow),
            timeout_seconds: over.timeout_seconds.or(self.timeout_seconds),
            max_pages: over.max_pages.or(self.max_pages),
            max_depth: over.max_depth.or(self.max_depth),
        }
    }

    /// Parse a YAML layer
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Load a YAML layer from disk
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Layer built from `EPIFLOW_*` variables as provided by `lookup`
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };
        let number = |name: &str| -> anyhow::Result<Option<u64>> {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, v))
                })
                .transpose()
        };

        Ok(Self {
            bucket: var("BUCKET"),
            dir_prefix: var("DIR_PREFIX"),
            project: var("PROJECT"),
            region: var("REGION"),
            workflow: var("WORKFLOW"),
            timeout_seconds: number("TIMEOUT_SECONDS")?,
            max_pages: number("MAX_PAGES")?.map(|n| n as usize),
            max_depth: number("MAX_DEPTH")?.map(|n| n as usize),
        })
    }

    /// Layer from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }
}

/// Fully merged configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub bucket: Option<String>,
    /// Root prefix, empty or ending in exactly one `/`
    pub dir_prefix: String,
    pub project: Option<String>,
    pub region: Option<String>,
    pub workflow: Option<String>,
    pub call_timeout: Duration,
    pub max_pages: usize,
    pub max_depth: usize,
    /// Config files that contributed, lowest priority first
    pub sources: Vec<PathBuf>,
}

impl ResolvedConfig {
    /// Freeze a merged layer, filling defaults
    pub fn from_layer(layer: ConfigLayer, sources: Vec<PathBuf>) -> Self {
        Self {
            bucket: layer.bucket,
            dir_prefix: normalize_root(layer.dir_prefix.as_deref().unwrap_or_default()),
            project: layer.project,
            region: layer.region,
            workflow: layer.workflow,
            call_timeout: layer
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
            max_pages: layer.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            max_depth: layer.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            sources,
        }
    }

    pub fn require_bucket(&self) -> Result<&str> {
        require(self.bucket.as_deref(), "bucket", "--bucket or EPIFLOW_BUCKET")
    }

    pub fn require_project(&self) -> Result<&str> {
        require(self.project.as_deref(), "project", "--project or EPIFLOW_PROJECT")
    }

    pub fn require_region(&self) -> Result<&str> {
        require(self.region.as_deref(), "region", "--region or EPIFLOW_REGION")
    }

    pub fn require_workflow(&self) -> Result<&str> {
        require(self.workflow.as_deref(), "workflow", "--workflow or EPIFLOW_WORKFLOW")
    }

    /// Scanner bounds from this configuration
    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            call_timeout: self.call_timeout,
        }
    }
}

fn require<'a>(value: Option<&'a str>, name: &str, hint: &str) -> Result<&'a str> {
    value.ok_or_else(|| EpiflowError::Configuration(format!("no {} configured (set {})", name, hint)))
}

/// Find the project config file by searching `start` and its parents
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".epiflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// User-level config file location
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("epiflow").join("config.yaml"))
}

/// Load configuration from all sources, with `overrides` (CLI flags) on top
pub fn load(explicit: Option<&Path>, overrides: ConfigLayer) -> Result<ResolvedConfig> {
    load_layers(explicit, overrides).map_err(|e| EpiflowError::Configuration(format!("{:#}", e)))
}

fn load_layers(explicit: Option<&Path>, overrides: ConfigLayer) -> anyhow::Result<ResolvedConfig> {
    let mut merged = ConfigLayer::default();
    let mut sources = Vec::new();

    let user = user_config_path().filter(|p| p.exists());
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let project = find_project_config(&cwd);

    for path in [user, project].into_iter().flatten() {
        merged = merged.merge(ConfigLayer::from_file(&path)?);
        sources.push(path);
    }

    if let Some(path) = explicit {
        merged = merged.merge(ConfigLayer::from_file(path)?);
        sources.push(path.to_path_buf());
    }

    merged = merged.merge(ConfigLayer::from_env()?).merge(overrides);

    Ok(ResolvedConfig::from_layer(merged, sources))
}
