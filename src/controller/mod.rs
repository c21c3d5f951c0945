//! Controller module for search-operator.
//!
//! Contains the reconciliation loop, node group model, StatefulSet access,
//! generation expectations, error handling and status management.

pub mod context;
pub mod error;
pub mod expectations;
pub mod node_group;
pub mod reconciler;
pub mod status;
pub mod store;
