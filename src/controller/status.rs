//! Status management utilities.
//!
//! Provides helpers for building and updating SearchCluster status conditions.

use crate::crd::{ClusterPhase, Condition, SearchClusterStatus};

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Start from existing conditions
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions.to_vec(),
        }
    }

    /// Add or update a condition
    ///
    /// The transition time of an existing condition is kept when its status
    /// did not change.
    pub fn set(&mut self, mut condition: Condition) -> &mut Self {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Set Ready condition
    pub fn ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::ready(ready, reason, message, generation))
    }

    /// Set Progressing condition
    pub fn progressing(
        &mut self,
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::progressing(
            progressing,
            reason,
            message,
            generation,
        ))
    }

    /// Set DataMigrating condition
    pub fn data_migrating(
        &mut self,
        migrating: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::data_migrating(
            migrating, reason, message, generation,
        ))
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}

/// Observed state of a cluster after a pass.
#[derive(Debug, Clone, Default)]
pub struct StatusInput {
    pub phase: ClusterPhase,
    pub available_nodes: i32,
    pub leaving_nodes: Vec<String>,
    pub message: Option<String>,
    pub generation: Option<i64>,
}

/// Build the status of a cluster, keeping transition times of unchanged
/// conditions from `previous`.
pub fn build_status(previous: Option<&SearchClusterStatus>, input: StatusInput) -> SearchClusterStatus {
    let mut builder = previous
        .map(|s| ConditionBuilder::from_existing(&s.conditions))
        .unwrap_or_default();
    let generation = input.generation;

    match input.phase {
        ClusterPhase::Ready => {
            builder
                .ready(true, "Converged", "Cluster topology converged", generation)
                .progressing(false, "Converged", "No pending changes", generation)
                .data_migrating(false, "Converged", "No data migration", generation);
        }
        ClusterPhase::Downscaling => {
            builder
                .ready(false, "Downscaling", "Removing nodes", generation)
                .progressing(true, "Downscaling", "Removing nodes", generation)
                .data_migrating(false, "Downscaling", "No data migration", generation);
        }
        ClusterPhase::MigratingData => {
            let message = format!(
                "Waiting for data to migrate away from {}",
                input.leaving_nodes.join(", ")
            );
            builder
                .ready(false, "MigratingData", &message, generation)
                .progressing(true, "MigratingData", &message, generation)
                .data_migrating(true, "MigratingData", &message, generation);
        }
        ClusterPhase::Failed => {
            let message = input.message.as_deref().unwrap_or("Reconciliation failed");
            builder
                .ready(false, "ReconciliationFailed", message, generation)
                .progressing(false, "ReconciliationFailed", message, generation);
        }
        ClusterPhase::Pending => {
            builder.progressing(true, "Pending", "Waiting for StatefulSets", generation);
        }
    }

    SearchClusterStatus {
        phase: input.phase,
        available_nodes: input.available_nodes,
        leaving_nodes: input.leaving_nodes,
        observed_generation: generation,
        conditions: builder.build(),
        message: input.message,
    }
}
