//! Types for parsed search cluster information.
//!
//! These types represent the parsed output of the `_cat/shards` API in its
//! JSON form (`?format=json`).

use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when parsing cluster data.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid shard state: {0}")]
    InvalidShardState(String),
    #[error("Invalid shards payload: {0}")]
    InvalidShards(#[from] serde_json::Error),
}

/// Allocation state of a shard copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    /// Active and serving.
    Started,
    /// Being moved to another node.
    Relocating,
    /// Being recovered on its node.
    Initializing,
    /// Not allocated to any node.
    Unassigned,
}

impl FromStr for ShardState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STARTED" => Ok(ShardState::Started),
            "RELOCATING" => Ok(ShardState::Relocating),
            "INITIALIZING" => Ok(ShardState::Initializing),
            "UNASSIGNED" => Ok(ShardState::Unassigned),
            _ => Err(ParseError::InvalidShardState(s.to_string())),
        }
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardState::Started => write!(f, "STARTED"),
            ShardState::Relocating => write!(f, "RELOCATING"),
            ShardState::Initializing => write!(f, "INITIALIZING"),
            ShardState::Unassigned => write!(f, "UNASSIGNED"),
        }
    }
}

/// Primary or replica copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardType {
    Primary,
    Replica,
}

/// One shard copy as reported by `_cat/shards`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Index name.
    pub index: String,
    /// Shard number within the index.
    pub shard: String,
    /// Primary or replica.
    pub shard_type: ShardType,
    /// Allocation state.
    pub state: ShardState,
    /// Name of the node holding this copy. `None` when unassigned.
    ///
    /// For relocating copies this is the source node.
    pub node: Option<String>,
}

impl Shard {
    /// Create a started copy on the given node.
    pub fn started(index: &str, shard: &str, shard_type: ShardType, node: &str) -> Self {
        Self {
            index: index.to_string(),
            shard: shard.to_string(),
            shard_type,
            state: ShardState::Started,
            node: Some(node.to_string()),
        }
    }

    pub fn with_state(mut self, state: ShardState) -> Self {
        self.state = state;
        self
    }

    /// Whether both copies belong to the same shard of the same index.
    pub fn same_shard(&self, other: &Shard) -> bool {
        self.index == other.index && self.shard == other.shard
    }

    pub fn is_on(&self, node: &str) -> bool {
        self.node.as_deref() == Some(node)
    }
}

#[derive(Deserialize)]
struct RawShard {
    index: String,
    shard: String,
    prirep: String,
    state: String,
    #[serde(default)]
    node: Option<String>,
}

impl TryFrom<RawShard> for Shard {
    type Error = ParseError;

    fn try_from(raw: RawShard) -> Result<Self, Self::Error> {
        let state = raw.state.parse()?;
        // Relocating copies report "<source> -> <ip> <id> <target>"
        let node = raw
            .node
            .as_deref()
            .and_then(|n| n.split(" -> ").next())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let shard_type = if raw.prirep == "p" {
            ShardType::Primary
        } else {
            ShardType::Replica
        };
        Ok(Shard {
            index: raw.index,
            shard: raw.shard,
            shard_type,
            state,
            node,
        })
    }
}

/// Parse the JSON body of `GET /_cat/shards?format=json`.
pub fn parse_cat_shards(body: &str) -> Result<Vec<Shard>, ParseError> {
    let raw: Vec<RawShard> = serde_json::from_str(body)?;
    raw.into_iter().map(Shard::try_from).collect()
}
