pub mod backoff;
pub mod bridgeapi;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use bridgeapi::{BridgeApi, Client as BridgeClient, ClientBuilder, SessionCache};
pub use config::OperatorConfig;
pub use controller::{
    Context, Error, FINALIZER, Result, TeamContext, error_policy, reconcile, reconcile_team,
    team_error_policy,
};
pub use crd::{BridgeCluster, BridgeTeam};
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};

/// Run the BridgeCluster controller
///
/// Watches BridgeCluster resources in `namespace`, or cluster-wide when
/// `None`, and reconciles them with the given context until the watch
/// stream ends.
pub async fn run_controller(client: Client, ctx: Arc<Context>, namespace: Option<&str>) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for BridgeCluster resources (scope: {})",
        scope_msg
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = ctx.health {
        state.set_ready(true).await;
    }

    let clusters: Api<BridgeCluster> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    // Use any_semantic() for more reliable resource discovery
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(clusters, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // Expected after deletion when a late event arrives for the object
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}

/// Run the BridgeTeam controller
///
/// Watches BridgeTeam resources in `namespace`, or cluster-wide when `None`.
pub async fn run_team_controller(client: Client, ctx: Arc<TeamContext>, namespace: Option<&str>) {
    tracing::info!(
        "Starting controller for BridgeTeam resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let teams: Api<BridgeTeam> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    Controller::new(teams, WatcherConfig::default().any_semantic())
        .run(reconcile_team, team_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => tracing::debug!("Reconciled team: {}", obj.name),
                Err(e) => tracing::warn!("Team reconciliation error: {:?}", e),
            }
        })
        .await;

    tracing::error!("Team controller stream ended unexpectedly");
}
