//! Search cluster client module.
//!
//! The downscale logic talks to the search cluster through four small traits,
//! one per concern, so each can be faked or mocked on its own. [`SearchClient`]
//! implements all of them over the REST API.
//!
//! ## Architecture
//!
//! - `search_client`: `reqwest`-based client and its error type
//! - `types`: parsed `_cat/shards` output
//!
//! ## Example
//!
//! ```rust,ignore
//! use search_operator::client::{SearchClient, SearchClientConfig, ShardLister};
//!
//! let client = SearchClient::new(SearchClientConfig::new("http://logs-http.default.svc:9200"))?;
//! let shards = client.get_shards().await?;
//! ```

pub mod search_client;
pub mod types;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

pub use search_client::{
    ALLOCATION_EXCLUDE_SETTING, MINIMUM_MASTER_NODES_SETTING, NONE_EXCLUDED, SearchClient,
    SearchClientConfig, SearchError, allocation_exclude_value,
};
pub use types::{ParseError, Shard, ShardState, ShardType, parse_cat_shards};

/// Lists the shard copies of the cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShardLister: Send + Sync {
    async fn get_shards(&self) -> Result<Vec<Shard>, SearchError>;
}

/// Excludes nodes from shard allocation so that their data moves elsewhere.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AllocationExclusions: Send + Sync {
    /// Replace the exclusion list with `nodes`. An empty list clears it.
    async fn exclude_from_shard_allocation(&self, nodes: &[String]) -> Result<(), SearchError>;
}

/// Legacy (zen1) discovery quorum setting.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LegacyQuorum: Send + Sync {
    async fn set_minimum_master_nodes(&self, count: i32) -> Result<(), SearchError>;
}

/// Voting configuration exclusions (zen2).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VotingExclusions: Send + Sync {
    async fn add_voting_config_exclusions(&self, nodes: &[String]) -> Result<(), SearchError>;
}
