//! Channel existence checks against the resource API.

use std::time::Duration;

use saladbar_proto::has_api_prefix;

use crate::config::NotifyConfig;
use crate::error::{Error, Result};

/// Decides whether a channel names a live API resource.
#[derive(Debug, Clone)]
pub struct PathValidator {
    client: reqwest::Client,
    base_url: String,
}

impl PathValidator {
    /// Create a validator probing the API at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("saladbar-notify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build probe client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a validator from the service configuration.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        Self::new(config.api_base_url(), config.probe_timeout)
    }

    /// Base URL of the resource API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL probed for `path`.
    pub fn probe_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET the resource behind `path`.
    ///
    /// Any status outside 400..=599 counts as existing. Transport failures
    /// are returned as [`Error::Probe`].
    pub async fn probe(&self, path: &str) -> Result<bool> {
        let url = self.probe_url(path);
        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();

        tracing::debug!(url = %url, status, "existence probe");
        Ok(!(400..600).contains(&status))
    }

    /// Whether `path` may be subscribed to.
    ///
    /// Paths outside the API prefix are rejected without a request.
    pub async fn is_valid(&self, path: &str) -> Result<bool> {
        if !has_api_prefix(path) {
            return Ok(false);
        }
        self.probe(path).await
    }
}
