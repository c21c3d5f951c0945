//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler,
//! including the Kubernetes client, event recorder, StatefulSet cache and
//! generation expectations.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::Store;
use kube::{Client, Resource};

use crate::config::OperatorConfig;
use crate::controller::expectations::Expectations;
use crate::crd::SearchCluster;
use crate::downscale::{EventSeverity, RecordedEvent};
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "search-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Runtime configuration
    pub config: OperatorConfig,
    /// Cache of owned StatefulSets
    pub statefulsets: Store<StatefulSet>,
    /// Generations we expect to observe after our own updates
    pub expectations: Arc<Expectations>,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        config: OperatorConfig,
        statefulsets: Store<StatefulSet>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: Some(config.pod_name.clone()),
            },
            health_state,
            config,
            statefulsets,
            expectations: Arc::new(Expectations::new()),
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    async fn publish(
        &self,
        resource: &SearchCluster,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &SearchCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &SearchCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }

    /// Publish the events recorded during a downscale pass
    pub async fn publish_recorded_events(&self, resource: &SearchCluster, events: &[RecordedEvent]) {
        for event in events {
            let note = Some(event.note.clone());
            match event.severity {
                EventSeverity::Normal => {
                    self.publish_normal_event(resource, &event.reason, &event.action, note)
                        .await
                }
                EventSeverity::Warning => {
                    self.publish_warning_event(resource, &event.reason, &event.action, note)
                        .await
                }
            }
        }
    }
}
