//! HTTP client for the search cluster REST API.
//!
//! Wraps `reqwest` and implements the shard, allocation and quorum traits
//! consumed by the downscale logic.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::client::types::{ParseError, Shard, parse_cat_shards};
use crate::client::{AllocationExclusions, LegacyQuorum, ShardLister, VotingExclusions};

/// Setting excluding nodes from shard allocation.
pub const ALLOCATION_EXCLUDE_SETTING: &str = "cluster.routing.allocation.exclude._name";
/// Legacy (zen1) minimum number of master-eligible nodes.
pub const MINIMUM_MASTER_NODES_SETTING: &str = "discovery.zen.minimum_master_nodes";
/// Placeholder excluding nothing. An empty value is ignored by the cluster.
pub const NONE_EXCLUDED: &str = "none_excluded";

/// Errors that can occur during search API calls.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(#[from] ParseError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SearchError {
    /// Network failures, throttling and server-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Http(_) => true,
            SearchError::Status { status, .. } => *status >= 500 || *status == 429,
            SearchError::Decode(_) | SearchError::InvalidConfig(_) => false,
        }
    }
}

/// Configuration for connecting to a search cluster.
#[derive(Clone, Debug)]
pub struct SearchClientConfig {
    /// Base URL, e.g. `http://logs-http.default.svc:9200`.
    pub base_url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl SearchClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for one search cluster.
#[derive(Clone, Debug)]
pub struct SearchClient {
    base_url: String,
    client: reqwest::Client,
    /// Some master runs a version without voting configuration exclusions.
    legacy_discovery: bool,
}

impl SearchClient {
    /// Build a client. Fails on a malformed base URL.
    pub fn new(config: SearchClientConfig) -> Result<Self, SearchError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SearchError::InvalidConfig(format!(
                "base URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url,
            client,
            legacy_discovery: false,
        })
    }

    /// Mark the cluster as still using legacy discovery on some master.
    ///
    /// Voting exclusions become a no-op, since those versions have no such API.
    pub fn with_legacy_discovery(mut self, legacy: bool) -> Self {
        self.legacy_discovery = legacy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and fail on non-2xx status, returning the body.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, SearchError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Update a single transient cluster setting.
    async fn put_transient_setting(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), SearchError> {
        let url = format!("{}/_cluster/settings", self.base_url);
        let mut settings = serde_json::Map::new();
        settings.insert(key.to_string(), value);
        self.send(
            self.client
                .put(&url)
                .json(&json!({ "transient": settings })),
        )
        .await?;
        Ok(())
    }
}

/// Value of the allocation exclusion setting for the given node names.
pub fn allocation_exclude_value(nodes: &[String]) -> String {
    if nodes.is_empty() {
        NONE_EXCLUDED.to_string()
    } else {
        nodes.join(",")
    }
}

#[async_trait]
impl ShardLister for SearchClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn get_shards(&self) -> Result<Vec<Shard>, SearchError> {
        let url = format!("{}/_cat/shards?format=json", self.base_url);
        let body = self.send(self.client.get(&url)).await?;
        let shards = parse_cat_shards(&body)?;
        debug!(count = shards.len(), "Listed shards");
        Ok(shards)
    }
}

#[async_trait]
impl AllocationExclusions for SearchClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn exclude_from_shard_allocation(&self, nodes: &[String]) -> Result<(), SearchError> {
        let value = allocation_exclude_value(nodes);
        debug!(exclude = %value, "Setting shard allocation exclusions");
        self.put_transient_setting(ALLOCATION_EXCLUDE_SETTING, json!(value))
            .await
    }
}

#[async_trait]
impl LegacyQuorum for SearchClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn set_minimum_master_nodes(&self, count: i32) -> Result<(), SearchError> {
        if count < 1 {
            return Err(SearchError::InvalidConfig(format!(
                "minimum master nodes must be at least 1, got {}",
                count
            )));
        }
        self.put_transient_setting(MINIMUM_MASTER_NODES_SETTING, json!(count))
            .await
    }
}

#[async_trait]
impl VotingExclusions for SearchClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn add_voting_config_exclusions(&self, nodes: &[String]) -> Result<(), SearchError> {
        if nodes.is_empty() {
            return Ok(());
        }
        if self.legacy_discovery {
            debug!(nodes = ?nodes, "Legacy discovery in use, skipping voting exclusions");
            return Ok(());
        }
        let url = format!(
            "{}/_cluster/voting_config_exclusions?node_names={}",
            self.base_url,
            nodes.join(",")
        );
        self.send(self.client.post(&url)).await?;
        Ok(())
    }
}
