//! Runtime configuration.
//!
//! Read from the environment at startup. Every field has a default so the
//! operator can run locally without any variable set.

use std::time::Duration;

use serde::Deserialize;

use crate::client::SearchClientConfig;
use crate::controller::error::{Error, Result};

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct OperatorConfig {
    /// The name of the pod on which this instance is running.
    #[serde(default = "default_pod_name")]
    pub pod_name: String,
    /// The namespace the operator runs in. Holds the leader election lease.
    #[serde(default = "default_namespace")]
    pub pod_namespace: String,
    /// Restrict the operator to one namespace. Cluster-wide when unset.
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Scheme of the search cluster HTTP endpoint.
    #[serde(default = "default_search_scheme")]
    pub search_scheme: String,
    /// Port of the search cluster HTTP endpoint.
    #[serde(default = "default_search_port")]
    pub search_port: u16,
    /// Timeout of a single search API request.
    #[serde(default = "default_search_request_timeout_secs")]
    pub search_request_timeout_secs: u64,

    /// Port of the health and metrics server.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_pod_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_search_scheme() -> String {
    "http".to_string()
}

fn default_search_port() -> u16 {
    9200
}

fn default_search_request_timeout_secs() -> u64 {
    30
}

fn default_health_port() -> u16 {
    8080
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            pod_name: default_pod_name(),
            pod_namespace: default_namespace(),
            watch_namespace: None,
            search_scheme: default_search_scheme(),
            search_port: default_search_port(),
            search_request_timeout_secs: default_search_request_timeout_secs(),
            health_port: default_health_port(),
        }
    }
}

impl OperatorConfig {
    /// Build the config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_iter(std::env::vars())
    }

    /// Build the config from key/value pairs, as found in the environment.
    pub fn from_iter<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)
            .map_err(|e| Error::Validation(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.search_scheme != "http" && self.search_scheme != "https" {
            return Err(Error::Validation(format!(
                "SEARCH_SCHEME must be http or https, got {:?}",
                self.search_scheme
            )));
        }
        if self.search_request_timeout_secs == 0 {
            return Err(Error::Validation(
                "SEARCH_REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Client configuration for the HTTP service of a cluster.
    pub fn search_client_config(&self, namespace: &str, service: &str) -> SearchClientConfig {
        SearchClientConfig::new(format!(
            "{}://{}.{}.svc:{}",
            self.search_scheme, service, namespace, self.search_port
        ))
        .with_request_timeout(Duration::from_secs(self.search_request_timeout_secs))
    }
}
