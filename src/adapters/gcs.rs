//! Google Cloud Storage adapter.
//!
//! Uses the JSON API object listing endpoint, which supports a `prefix`,
//! an optional `/` delimiter and page tokens. That is the only primitive
//! the scanner needs.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::auth::TokenSource;
use super::{ListPage, ListRequest, ObjectStore};

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Objects returned per page (API maximum)
const PAGE_SIZE: u32 = 1000;

/// GCS bucket listing client
pub struct GcsStore {
    bucket: String,
    endpoint: String,
    auth: Arc<TokenSource>,
    client: reqwest::Client,
}

/// Response from `storage/v1/b/{bucket}/o`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsStore {
    /// Create a client for `bucket`
    pub fn new(bucket: impl Into<String>, auth: Arc<TokenSource>, client: reqwest::Client) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth,
            client,
        }
    }

    /// Point at a different endpoint (emulators)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn objects_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.endpoint, self.bucket)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn name(&self) -> &str {
        "storage"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let token = self.auth.token().await?;

        let mut query: Vec<(&str, String)> = vec![
            ("prefix", request.prefix.clone()),
            ("maxResults", PAGE_SIZE.to_string()),
            ("fields", "items(name),prefixes,nextPageToken".to_string()),
        ];
        if request.delimited {
            query.push(("delimiter", "/".to_string()));
        }
        if let Some(ref page_token) = request.page_token {
            query.push(("pageToken", page_token.clone()));
        }

        debug!(bucket = %self.bucket, prefix = %request.prefix, delimited = request.delimited, "Listing objects");

        let response = self
            .client
            .get(self.objects_url())
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to list gs://{}/{}", self.bucket, request.prefix))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Listing gs://{}/{} failed with {}: {}",
                self.bucket,
                request.prefix,
                status,
                body.trim()
            );
        }

        let body: ObjectsResponse = response
            .json()
            .await
            .context("Failed to parse object listing response")?;

        Ok(ListPage {
            prefixes: body.prefixes,
            keys: body.items.into_iter().map(|item| item.name).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
