//! Output rendering for listings and status views.
//!
//! Three listing formats:
//! - **Table** (default): fixed-width columns, creation time in local time
//! - **Uri**: one `gs://` URI per run directory
//! - **Args**: one `--exp-id X --run-id Y` line per run, for job submission

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use clap::ValueEnum;

use crate::core::{ActiveStatus, CatalogListing};
use crate::domain::ExperimentPath;

/// Listing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,

    /// One storage URI per run
    Uri,

    /// One `--exp-id X --run-id Y` line per run
    Args,
}

/// Render a catalog listing. Every line, including the last, ends with `\n`.
pub fn render_listing(listing: &CatalogListing, format: OutputFormat, bucket: &str) -> String {
    let mut out = String::new();

    match format {
        OutputFormat::Uri => {
            for entry in &listing.entries {
                let _ = writeln!(out, "{}", entry.run.uri(bucket, &listing.root_prefix));
            }
        }
        OutputFormat::Args => {
            for entry in &listing.entries {
                let _ = writeln!(out, "{}", entry.run.submit_args());
            }
        }
        OutputFormat::Table => {
            let width = listing
                .entries
                .iter()
                .map(|e| e.run.experiment.as_str().len() + 2)
                .max()
                .unwrap_or(0)
                .max("EXPERIMENT".len());

            let _ = writeln!(out, "{:<width$} {:<26} {}", "EXPERIMENT", "RUN ID", "CREATED");
            let _ = writeln!(out, "{}", "-".repeat(width + 27 + 23));

            for entry in &listing.entries {
                let marker = if entry.has_multiple_runs() { " *" } else { "" };
                let created = entry
                    .run
                    .run_id
                    .timestamp()
                    .map(local_time)
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "{:<width$} {:<26} {}",
                    format!("{}{}", entry.run.experiment, marker),
                    entry.run.run_id,
                    created
                );
            }

            if listing.entries.iter().any(|e| e.has_multiple_runs()) {
                let _ = writeln!(out, "\n* experiment has multiple runs");
            }
        }
    }

    out
}

/// Render experiment paths, one per line
pub fn render_experiments(experiments: &[ExperimentPath]) -> String {
    let mut out = String::new();
    for experiment in experiments {
        let _ = writeln!(out, "{}", experiment);
    }
    out
}

/// Render one status poll
pub fn render_status(status: &ActiveStatus) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Status as of {}", local_time(status.fetched_at));
    for failure in &status.failures {
        let _ = writeln!(out, "! {}", failure);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "WORKFLOWS ({})", status.workflows.len());
    if status.workflows.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let _ = writeln!(
            out,
            "  {:<32} {:<26} {:<10} {}",
            "EXPERIMENT", "EXECUTION", "STATE", "STARTED"
        );
        for wf in &status.workflows {
            let _ = writeln!(
                out,
                "  {:<32} {:<26} {:<10} {}",
                wf.experiment_id().unwrap_or_else(|| "-".to_string()),
                truncate(wf.short_name(), 26),
                wf.state,
                wf.start_time.map(local_time).unwrap_or_else(|| "-".to_string())
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "JOBS ({})", status.jobs.len());
    if status.jobs.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let _ = writeln!(
            out,
            "  {:<32} {:<10} {:<30} {:<10} {}",
            "EXPERIMENT", "STAGE", "JOB", "STATE", "TASKS"
        );
        for job in &status.jobs {
            let _ = writeln!(
                out,
                "  {:<32} {:<10} {:<30} {:<10} {}",
                job.experiment_id().unwrap_or("-"),
                job.stage().unwrap_or("-"),
                truncate(job.short_name(), 30),
                job.state,
                job.progress().describe(&job.state)
            );
        }
    }

    out
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp in the local timezone with its abbreviation (e.g. `EDT`)
pub fn local_time(at: DateTime<Utc>) -> String {
    match local_zone() {
        Some(zone) => zoned_time(at, zone),
        // Unknown zone name: fall back to the numeric offset
        None => at
            .with_timezone(&Local)
            .format(&format!("{} %:z", TIME_FORMAT))
            .to_string(),
    }
}

/// Timestamp in `zone` with its abbreviation
pub fn zoned_time(at: DateTime<Utc>, zone: Tz) -> String {
    at.with_timezone(&zone)
        .format(&format!("{} %Z", TIME_FORMAT))
        .to_string()
}

/// The IANA zone from `TZ`, else the one the system is configured with
fn local_zone() -> Option<Tz> {
    std::env::var("TZ")
        .ok()
        .and_then(|name| name.trim_start_matches(':').parse().ok())
        .or_else(|| iana_time_zone::get_timezone().ok()?.parse().ok())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
