//! Command-line interface for epiflow.
//!
//! Provides commands for listing experiment runs in storage, listing
//! experiment paths, watching live pipeline status and showing the
//! resolved configuration.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::{BatchClient, GcsStore, TokenSource, WorkflowsClient};
use crate::config::{self, ConfigLayer, ResolvedConfig};
use crate::core::catalog::DEFAULT_LIMIT;
use crate::core::status::parse_window;
use crate::core::{
    CatalogQuery, ExperimentCatalog, FilterPatterns, PrefixScanner, StatusAggregator, StatusQuery,
};

pub mod format;

use format::{render_experiments, render_listing, render_status, OutputFormat};

/// epiflow - Experiment discovery and status for batch simulation pipelines
#[derive(Parser, Debug)]
#[command(name = "epiflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file layered over the user and project config files
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Storage location flags shared by listing commands
#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Bucket holding pipeline artifacts
    #[arg(long)]
    pub bucket: Option<String>,

    /// Root prefix inside the bucket
    #[arg(long)]
    pub dir_prefix: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List experiment runs in storage, newest first
    List {
        /// Glob filter on experiment paths (e.g. "202605/", "test/exp*")
        filter: Option<String>,

        /// Show only the newest run of each experiment
        #[arg(long)]
        latest: bool,

        /// Maximum runs to show (0 = unlimited)
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// List experiment paths by walking the storage hierarchy
    Experiments {
        /// Glob filter on experiment paths
        filter: Option<String>,

        /// Maximum directory depth to descend
        #[arg(long)]
        max_depth: Option<usize>,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Show active workflows and batch jobs
    Status {
        /// Only show work for this experiment
        #[arg(long)]
        exp_id: Option<String>,

        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Also show work that finished within this window (e.g. 30m, 2h, 1d)
        #[arg(long, value_parser = parse_window)]
        recent: Option<chrono::Duration>,

        /// Seconds between polls in watch mode
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Cloud project
        #[arg(long)]
        project: Option<String>,

        /// Cloud region
        #[arg(long)]
        region: Option<String>,

        /// Workflow name
        #[arg(long)]
        workflow: Option<String>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let explicit = self.config.as_deref();

        match self.command {
            Commands::List {
                filter,
                latest,
                limit,
                format,
                storage,
            } => {
                let cfg = config::load(explicit, storage.into())?;
                list_runs(&cfg, filter, latest, limit, format).await
            }
            Commands::Experiments {
                filter,
                max_depth,
                storage,
            } => {
                let overrides = ConfigLayer {
                    max_depth,
                    ..ConfigLayer::from(storage)
                };
                let cfg = config::load(explicit, overrides)?;
                list_experiments(&cfg, filter).await
            }
            Commands::Status {
                exp_id,
                watch,
                recent,
                interval,
                project,
                region,
                workflow,
            } => {
                let overrides = ConfigLayer {
                    project,
                    region,
                    workflow,
                    ..Default::default()
                };
                let cfg = config::load(explicit, overrides)?;
                let query = StatusQuery { exp_id, recent };
                if watch {
                    watch_status(&cfg, &query, Duration::from_secs(interval.max(1))).await
                } else {
                    show_status(&cfg, &query).await
                }
            }
            Commands::Config => {
                let cfg = config::load(explicit, ConfigLayer::default())?;
                show_config(&cfg);
                Ok(())
            }
        }
    }
}

impl From<StorageArgs> for ConfigLayer {
    fn from(args: StorageArgs) -> Self {
        ConfigLayer {
            bucket: args.bucket,
            dir_prefix: args.dir_prefix,
            ..Default::default()
        }
    }
}

fn http_client(cfg: &ResolvedConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(cfg.call_timeout)
        .build()
        .context("Failed to build HTTP client")
}

fn build_scanner(cfg: &ResolvedConfig) -> Result<PrefixScanner> {
    let bucket = cfg.require_bucket()?;
    let auth = Arc::new(TokenSource::from_env());
    let store = GcsStore::new(bucket, auth, http_client(cfg)?);
    Ok(PrefixScanner::new(Arc::new(store)).with_limits(cfg.scan_limits()))
}

fn build_aggregator(cfg: &ResolvedConfig) -> Result<StatusAggregator> {
    let project = cfg.require_project()?;
    let region = cfg.require_region()?;
    let workflow = cfg.require_workflow()?;

    let auth = Arc::new(TokenSource::from_env());
    let client = http_client(cfg)?;

    let workflows = WorkflowsClient::new(project, region, workflow, auth.clone(), client.clone());
    let jobs = BatchClient::new(project, region, auth, client);

    Ok(StatusAggregator::new(Arc::new(workflows), Arc::new(jobs))
        .with_call_timeout(cfg.call_timeout)
        .with_max_pages(cfg.max_pages))
}

/// List experiment runs
async fn list_runs(
    cfg: &ResolvedConfig,
    filter: Option<String>,
    latest: bool,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let catalog = ExperimentCatalog::new(build_scanner(cfg)?);
    let query = CatalogQuery {
        root_prefix: cfg.dir_prefix.clone(),
        filter,
        latest_only: latest,
        limit,
    };

    let listing = catalog.list(&query).await?;

    if listing.is_empty() {
        eprintln!("No experiments found under gs://{}/{}", cfg.require_bucket()?, listing.root_prefix);
        return Ok(());
    }

    write_stdout(&render_listing(&listing, format, cfg.require_bucket()?))?;

    if listing.is_truncated() {
        eprintln!(
            "Showing {} of {} runs (use --limit 0 to show all)",
            listing.len(),
            listing.total
        );
    }

    Ok(())
}

/// List experiment paths via a hierarchical scan
async fn list_experiments(cfg: &ResolvedConfig, filter: Option<String>) -> Result<()> {
    let scanner = build_scanner(cfg)?;
    let filter = FilterPatterns::from_optional(filter.as_deref())?;
    let scan_prefix = filter.as_ref().map(|f| f.scan_prefix()).unwrap_or_default();

    let mut experiments = scanner.list_experiments(&cfg.dir_prefix, &scan_prefix).await?;
    if let Some(ref filter) = filter {
        experiments = filter.filter(experiments);
    }

    if experiments.is_empty() {
        eprintln!("No experiments found under gs://{}/{}", cfg.require_bucket()?, cfg.dir_prefix);
        return Ok(());
    }

    write_stdout(&render_experiments(&experiments))
}

/// Show a single status poll
async fn show_status(cfg: &ResolvedConfig, query: &StatusQuery) -> Result<()> {
    let aggregator = build_aggregator(cfg)?;
    let status = aggregator.fetch_active(query).await;

    if let Some(err) = status.total_failure() {
        return Err(err.clone().into());
    }

    write_stdout(&render_status(&status))
}

/// Poll status until interrupted
async fn watch_status(cfg: &ResolvedConfig, query: &StatusQuery, interval: Duration) -> Result<()> {
    let aggregator = build_aggregator(cfg)?;

    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = stop_tx.send(());
    });

    loop {
        let status = tokio::select! {
            status = aggregator.fetch_active(query) => status,
            _ = &mut stop_rx => break,
        };

        // Clear screen, then write the whole frame at once
        let frame = format!(
            "\x1b[2J\x1b[H{}\nRefreshing every {}s, Ctrl+C to stop\n",
            render_status(&status),
            interval.as_secs()
        );
        write_stdout(&frame)?;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut stop_rx => break,
        }
    }

    eprintln!("Stopped watching");
    Ok(())
}

/// Show the resolved configuration
fn show_config(cfg: &ResolvedConfig) {
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".to_string());

    println!("epiflow configuration");
    println!();
    if cfg.sources.is_empty() {
        println!("Config files: (none - using environment and defaults)");
    } else {
        println!("Config files (lowest priority first):");
        for source in &cfg.sources {
            println!("  {}", source.display());
        }
    }
    println!();
    println!("Storage:");
    println!("  Bucket:      {}", show(&cfg.bucket));
    println!("  Dir prefix:  {}", if cfg.dir_prefix.is_empty() { "(bucket root)" } else { cfg.dir_prefix.as_str() });
    println!();
    println!("Pipeline services:");
    println!("  Project:     {}", show(&cfg.project));
    println!("  Region:      {}", show(&cfg.region));
    println!("  Workflow:    {}", show(&cfg.workflow));
    println!();
    println!("Limits:");
    println!("  Call timeout: {}s", cfg.call_timeout.as_secs());
    println!("  Max pages:    {}", cfg.max_pages);
    println!("  Max depth:    {}", cfg.max_depth);
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .context("Failed to write output")
}
