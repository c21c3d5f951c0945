//! Custom Resource Definitions (CRDs) for search-operator.
//!
//! - `SearchCluster`: declared topology of a search cluster as node sets

mod search_cluster;

pub use search_cluster::*;
