//! Bearer-authenticated JSON fetches against the directory API, with
//! transparent pagination.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Key carrying the continuation link in a paged directory response.
pub const NEXT_LINK_KEY: &str = "@odata.nextLink";

/// Most continuation pages followed for one listing.
pub const MAX_PAGES: usize = 100;

#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid response body: {0}")]
    Body(String),

    #[error("Pagination aborted: {0}")]
    Pagination(String),
}

#[async_trait]
pub trait DirectoryFetcher: Send + Sync + 'static {
    /// GET `url` with `bearer_token` and parse the body as JSON.
    async fn fetch(&self, url: &str, bearer_token: &str) -> Result<Value, FetchError>;

    /// Reads `next_link` and every page after it, returning the flattened `value` entries.
    ///
    /// Fails on a link that was already visited or after [`MAX_PAGES`] pages.
    async fn follow_pagination(
        &self,
        bearer_token: &str,
        next_link: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let mut members = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(next_link.to_string());

        while let Some(url) = next {
            if visited.len() >= MAX_PAGES {
                return Err(FetchError::Pagination(format!(
                    "More than {MAX_PAGES} pages"
                )));
            }
            if !visited.insert(url.clone()) {
                return Err(FetchError::Pagination(format!(
                    "Continuation link repeats: {url}"
                )));
            }

            let page = self.fetch(&url, bearer_token).await?;
            if let Some(values) = page.get("value").and_then(Value::as_array) {
                members.extend(values.iter().cloned());
            }
            next = page
                .get(NEXT_LINK_KEY)
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(members)
    }
}

/// Default fetcher backed by `reqwest`.
pub struct GraphFetcher {
    client: reqwest::Client,
}

impl GraphFetcher {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for GraphFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryFetcher for GraphFetcher {
    async fn fetch(&self, url: &str, bearer_token: &str) -> Result<Value, FetchError> {
        tracing::debug!("Fetching directory page: {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}

/// Shared HTTP client settings for calls to the identity provider and directory.
///
/// - `timeout`: 30 seconds, so a stalled provider cannot hold a request forever.
/// - `pool_idle_timeout`: 90 seconds.
/// - `pool_max_idle_per_host`: 32.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build()
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build configured HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
}
