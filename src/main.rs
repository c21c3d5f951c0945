//! search-operator - safely shrinks quorum-based search clusters on Kubernetes.
//!
//! Startup order:
//! 1. structured logging and configuration
//! 2. health server, so probes answer while waiting for leadership
//! 3. leader election, then the controller

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use search_operator::OperatorConfig;
use search_operator::health::{HealthState, run_health_server};
use search_operator::run_controller;

/// Lease configuration
const LEASE_NAME: &str = "search-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time left to in-flight passes once a shutdown signal arrives
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("search_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    let config = OperatorConfig::from_env()?;
    info!(
        pod = %config.pod_name,
        namespace = %config.pod_namespace,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("all"),
        "Starting search-operator"
    );

    let client = Client::try_default().await?;
    let health_state = Arc::new(HealthState::new());

    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    let lease_params = LeaseLockParams {
        holder_id: config.pod_name.clone(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: LEASE_TTL,
    };
    let lease = LeaseLock::new(client.clone(), &config.pod_namespace, lease_params);
    acquire_leadership(&lease).await;
    let renewal_handle = spawn_lease_renewal(lease);

    let controller_handle = {
        let health_state = health_state.clone();
        let client = client.clone();
        tokio::spawn(async move {
            run_controller(client, config, Some(health_state)).await;
        })
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        // Renewal only returns by panicking, losing the lease exits the process
        Err(e) = renewal_handle => {
            error!(error = %e, "Lease renewal task panicked");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            health_state.set_ready(false).await;
            info!(
                grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "Waiting for in-flight reconciliations"
            );
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Block until this instance holds the lease.
async fn acquire_leadership(lease: &LeaseLock) {
    info!(lease = LEASE_NAME, "Waiting to acquire leadership");
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another instance is leader, waiting"),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Keep renewing the lease. Exits the process when it is lost so that
/// Kubernetes restarts the pod into a fresh election.
#[allow(clippy::exit)]
fn spawn_lease_renewal(lease: LeaseLock) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match lease.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {}
                Ok(_) => {
                    error!("Lost leadership, shutting down");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "Failed to renew lease, shutting down");
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Wait for SIGTERM or SIGINT.
///
/// Failing to install a handler is fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
