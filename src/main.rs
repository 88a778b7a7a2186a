use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use bridge_operator::backoff::{Backoff, BackoffConfig};
use bridge_operator::bridgeapi::{ClientBuilder, SessionCache, SessionConfig};
use bridge_operator::controller::{
    Context, KubeClusterStore, KubeTeamDirectory, KubeTeamStore, TeamContext,
};
use bridge_operator::health::{HealthState, run_health_server};
use bridge_operator::resources::secret::KubeSecretCredentialProvider;
use bridge_operator::{OperatorConfig, run_controller, run_team_controller};

/// Lease configuration
const LEASE_NAME: &str = "bridge-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = OperatorConfig::parse();
    config.validate()?;

    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        // Check if a provider is already installed (common in test scenarios)
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            return Err(
                "Failed to install rustls crypto provider and no provider is available".into(),
            );
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bridge_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting bridge-operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_bind_address;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease_renewal_handle = if config.leader_elect {
        Some(acquire_leadership(&client).await)
    } else {
        info!("Leader election disabled");
        None
    };

    // Shared by the cluster client and BridgeTeam listings
    let cache = Arc::new(SessionCache::new(
        reqwest::Client::new(),
        SessionConfig::default(),
    ));

    let bridge = Arc::new(connect_bridge(&client, &config, cache.clone()).await?);
    info!(
        api_url = %bridge.api_url(),
        login_state = %bridge.login_state(),
        "Crunchy Bridge client ready"
    );

    let ctx = Arc::new(
        Context::new(Arc::new(KubeClusterStore::new(client.clone())), bridge)
            .with_watch_interval(config.watch_interval())
            .with_team_id(config.team_id.clone())
            .with_health(health_state.clone()),
    );

    info!("Watching BridgeCluster resources (apiVersion: crunchybridge.crunchydata.com/v1alpha1)");

    let team_ctx = Arc::new(
        TeamContext::new(
            Arc::new(KubeTeamStore::new(client.clone())),
            Arc::new(KubeTeamDirectory::new(client.clone(), cache, &config)),
        )
        .with_health(health_state.clone()),
    );

    let team_handle = {
        let team_client = client.clone();
        let namespace = config.namespace.clone();
        tokio::spawn(async move {
            run_team_controller(team_client, team_ctx, namespace.as_deref()).await;
        })
    };

    let controller_handle = {
        let controller_client = client.clone();
        let namespace = config.namespace.clone();
        tokio::spawn(async move {
            run_controller(controller_client, ctx, namespace.as_deref()).await;
        })
    };

    let lease_future = async {
        match lease_renewal_handle {
            // Renewal only exits via process::exit() or panic
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Lease renewal task panicked: {}", e);
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Cluster controller task panicked: {}", e);
            }
        }
        result = team_handle => {
            if let Err(e) = result {
                error!("Team controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = lease_future => {}
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            // Give in-flight reconciliations time to complete
            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Build the provider client, waiting for the credential Secret to become readable
async fn connect_bridge(
    client: &Client,
    config: &OperatorConfig,
    cache: Arc<SessionCache>,
) -> Result<bridge_operator::BridgeClient, Box<dyn std::error::Error>> {
    let provider = Arc::new(KubeSecretCredentialProvider::new(
        client.clone(),
        &config.credentials_namespace,
        &config.credentials_name,
        &config.key_field,
        &config.secret_field,
    ));

    let mut backoff = Backoff::new(BackoffConfig::default());
    loop {
        let mut builder = ClientBuilder::new()
            .api_url(&config.api_url)
            .operator_version(env!("CARGO_PKG_VERSION"))
            .credential_provider(provider.clone());
        if let Some(auth_url) = &config.auth_url {
            builder = builder.auth_url(auth_url);
        }

        match builder.build(cache.clone()).await {
            Ok(bridge) => return Ok(bridge),
            Err(e) if e.is_retryable() => {
                let delay = backoff.next_delay();
                warn!(
                    namespace = %config.credentials_namespace,
                    name = %config.credentials_name,
                    "Credential secret unavailable: {}, retrying in {:?}",
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Block until this instance holds the lease, then keep renewing it
///
/// Losing the lease exits the process so Kubernetes restarts it into a
/// fresh election.
async fn acquire_leadership(client: &Client) -> tokio::task::JoinHandle<()> {
    // Get pod identity for leader election
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let lease_lock = LeaseLock::new(
        client.clone(),
        &namespace,
        LeaseLockParams {
            holder_id: pod_name,
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        },
    );

    info!("Waiting to acquire leadership...");
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                break;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

            match lease_lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {}
                Ok(_) => {
                    error!("Lost leadership! Shutting down...");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Failed to renew lease: {}. Shutting down...", e);
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
