//! HTTP client for one backend

use crate::config::RunConfig;
use crate::error::{FetchError, HarnessError, HarnessResult};
use crate::retry::RetryPolicy;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, trace};

/// API client bound to a single backend (old or new)
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    name: String,
    retry: RetryPolicy,
}

impl BackendClient {
    /// Client for the old backend described by `config`
    pub fn for_old(config: &RunConfig) -> HarnessResult<Self> {
        Self::new("old", &config.old_url, config)
    }

    /// Client for the new backend described by `config`
    pub fn for_new(config: &RunConfig) -> HarnessResult<Self> {
        Self::new("new", &config.new_url, config)
    }

    pub fn new(name: &str, base_url: &str, config: &RunConfig) -> HarnessResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| HarnessError::config("http_client", e.to_string()))?;

        // Trailing slash so relative joins append instead of replacing
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&base).map_err(|e| HarnessError::config(name, format!("{base}: {e}")))?;

        Ok(Self {
            client,
            base_url,
            name: name.to_string(),
            retry: config.retry.clone(),
        })
    }

    /// Get the client name (for logging)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base URL.
    ///
    /// Segments are used as given; only characters that cannot appear
    /// literally in a path segment are percent-encoded.
    pub fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        // `\` is a path separator to the URL parser for http URLs
        let escaped = path
            .replace('%', "%25")
            .replace('?', "%3F")
            .replace('#', "%23")
            .replace('\\', "%5C");
        self.base_url
            .join(escaped.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                reason: e.to_string(),
            })
    }

    /// GET a JSON document, retrying on server-busy statuses
    pub async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.url_for(path)?;
        let mut attempt = 1;

        loop {
            trace!(backend = %self.name, %url, attempt, "GET");
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

            let status = response.status();
            if self.retry.is_retryable(status) {
                if !self.retry.should_retry(attempt, status) {
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        status,
                        attempts: attempt,
                    });
                }
                let delay = self.retry.backoff(attempt);
                debug!(
                    backend = %self.name,
                    %url,
                    %status,
                    attempt,
                    "Backend busy, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                debug!(backend = %self.name, %url, %status, "Non-success status, comparing body");
            }

            let raw_body = response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

            return serde_json::from_str(&raw_body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            });
        }
    }

    /// Check if the backend answers its health endpoint with success
    pub async fn is_healthy(&self, path: &str) -> bool {
        let Ok(url) = self.url_for(path) else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                trace!(backend = %self.name, error = %e, "Health probe failed");
                false
            }
        }
    }
}
