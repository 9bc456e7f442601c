//! OAuth access tokens for Google Cloud APIs.
//!
//! Tokens come from `EPIFLOW_ACCESS_TOKEN` when set, otherwise from
//! `gcloud auth print-access-token`. A gcloud token is reused until it is
//! older than the source's max age, then fetched again, so long-running
//! watch loops outlive the token's one hour lifetime.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

/// Environment variable holding a pre-minted access token
pub const ACCESS_TOKEN_ENV: &str = "EPIFLOW_ACCESS_TOKEN";

/// Age after which a gcloud token is fetched again
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(50 * 60);

const GCLOUD_TIMEOUT: Duration = Duration::from_secs(20);

/// Where bearer tokens come from
#[derive(Debug)]
pub enum TokenSource {
    /// A fixed token
    Static(String),

    /// Ask the gcloud CLI, again whenever the cached token is too old
    Gcloud {
        binary_path: String,
        max_age: Duration,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl TokenSource {
    /// Static token from the environment if present, else gcloud
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Self::Static(token.trim().to_string()),
            _ => Self::gcloud("gcloud"),
        }
    }

    pub fn gcloud(binary_path: impl Into<String>) -> Self {
        Self::Gcloud {
            binary_path: binary_path.into(),
            max_age: DEFAULT_TOKEN_MAX_AGE,
            cached: Mutex::new(None),
        }
    }

    /// Refetch gcloud tokens once they are `age` old. No effect on static tokens.
    pub fn with_max_age(mut self, age: Duration) -> Self {
        if let Self::Gcloud { max_age, .. } = &mut self {
            *max_age = age;
        }
        self
    }

    /// Current bearer token
    pub async fn token(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Gcloud {
                binary_path,
                max_age,
                cached,
            } => {
                // Held across the fetch so concurrent callers share one gcloud run
                let mut cached = cached.lock().await;
                if let Some((token, fetched_at)) = cached.as_ref() {
                    if fetched_at.elapsed() < *max_age {
                        return Ok(token.clone());
                    }
                    debug!(age = ?fetched_at.elapsed(), "Access token expired, refreshing");
                }

                let token = print_access_token(binary_path).await?;
                *cached = Some((token.clone(), Instant::now()));
                Ok(token)
            }
        }
    }
}

async fn print_access_token(binary_path: &str) -> Result<String> {
    let output = timeout(
        GCLOUD_TIMEOUT,
        Command::new(binary_path)
            .args(["auth", "print-access-token"])
            .output(),
    )
    .await
    .with_context(|| format!("gcloud timed out after {:?}", GCLOUD_TIMEOUT))?
    .with_context(|| format!("Failed to run '{} auth print-access-token'", binary_path))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "gcloud auth failed with exit code {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    let token = String::from_utf8(output.stdout).context("gcloud output is not valid UTF-8")?;
    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("gcloud returned an empty access token");
    }

    Ok(token)
}
