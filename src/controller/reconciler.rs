//! Reconciliation logic for BridgeCluster resources
//!
//! Each pass reloads the resource, asks the planner what to do for its
//! phase, and runs the planned effects in order against the provider and
//! the store. Timing is expressed only through the returned [`Action`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::bridgeapi::ApiError;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result, StoreError, delay_for_error};
use crate::controller::request::{create_request, spec_team_id};
use crate::controller::state_machine::{
    ClusterEvent, ClusterStateMachine, Effect, Observation, Requeue, TransitionResult, plan,
};
use crate::controller::status::{apply_connection_role, mirror_detail, set_phase, stamp};
use crate::crd::{BridgeCluster, ClusterPhase};

/// Finalizer guarding provider-side cleanup
pub const FINALIZER: &str = "crunchybridge.com/bridgecluster-finalizer";

/// Requeue after losing an optimistic-concurrency race on a write
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

fn object_key(cluster: &BridgeCluster) -> String {
    format!(
        "{}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    )
}

fn has_finalizer(cluster: &BridgeCluster) -> bool {
    cluster.finalizers().iter().any(|f| f == FINALIZER)
}

fn parse_phase(cluster: &BridgeCluster) -> Result<ClusterPhase> {
    cluster
        .phase_str()
        .parse()
        .map_err(Error::UnrecognizedPhase)
}

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<BridgeCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = cluster.name_any();
    let key = object_key(&cluster);

    debug!("Reconciling BridgeCluster");
    let result = reconcile_cluster(&ns, &name, &ctx).await;

    if let Some(health) = &ctx.health {
        health.metrics.set_login_state(ctx.bridge.login_state());
    }

    match result {
        Ok(action) => {
            ctx.clear_failures(&key);
            if let Some(health) = &ctx.health {
                health
                    .metrics
                    .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
            }
            Ok(action)
        }
        Err(e) if e.is_conflict() => {
            debug!("Resource changed during reconcile, requeuing: {}", e);
            Ok(Action::requeue(CONFLICT_REQUEUE))
        }
        Err(e) => {
            if let Some(health) = &ctx.health {
                health.metrics.record_error(&ns, &name, e.kind());
            }
            Err(e)
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<BridgeCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&cluster);
    let attempt = ctx.record_failure(&key);
    let delay = delay_for_error(&ctx.backoff, error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for {} (attempt {}): {}, requeuing in {:?}",
            key,
            attempt + 1,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?} for manual intervention",
            key, error, delay
        );
    }

    Action::requeue(delay)
}

async fn reconcile_cluster(ns: &str, name: &str, ctx: &Context) -> Result<Action> {
    let mut cluster = match ctx.store.get(ns, name).await {
        Ok(cluster) => cluster,
        Err(StoreError::NotFound(_)) => {
            debug!("BridgeCluster no longer exists");
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let phase = parse_phase(&cluster)?;
    let observation = Observation {
        phase,
        deletion_requested: cluster.metadata.deletion_timestamp.is_some(),
        has_finalizer: has_finalizer(&cluster),
        cluster_id: cluster.cluster_id().map(str::to_string),
    };
    let transition = plan(&observation);
    debug!(
        from = %transition.from,
        to = %transition.to,
        effects = transition.effects.len(),
        "{}",
        transition.description
    );

    for effect in &transition.effects {
        run_effect(effect, &mut cluster, ctx).await?;
    }

    Ok(match transition.requeue {
        Requeue::OnChange => Action::await_change(),
        Requeue::WatchInterval => Action::requeue(ctx.watch_interval),
    })
}

async fn run_effect(effect: &Effect, cluster: &mut BridgeCluster, ctx: &Context) -> Result<()> {
    match effect {
        Effect::AddFinalizer => {
            cluster.finalizers_mut().push(FINALIZER.to_string());
            *cluster = ctx.store.update(cluster).await?;
            info!("Added finalizer");
        }
        Effect::RemoveFinalizer => {
            cluster.finalizers_mut().retain(|f| f != FINALIZER);
            *cluster = ctx.store.update(cluster).await?;
            info!("Removed finalizer");
        }
        Effect::SetPhase(phase) => {
            write_phase(cluster, *phase, ctx).await?;
        }
        Effect::MarkDeleting => {
            if cluster.phase_str() != ClusterPhase::Deleting.as_str() {
                let mut marked = cluster.clone();
                if let Err(e) = write_phase(&mut marked, ClusterPhase::Deleting, ctx).await {
                    warn!("Failed to mark cluster as deleting: {}", e);
                } else {
                    *cluster = marked;
                }
            }
        }
        Effect::CreateCluster => create_cluster(cluster, ctx).await?,
        Effect::ObserveCluster => observe_cluster(cluster, ctx).await?,
        Effect::DeleteCluster(id) => match ctx.bridge.delete_cluster(id).await {
            Ok(()) => info!(cluster_id = %id, "Deleted provider cluster"),
            // Gone already, e.g. deleted on an earlier pass whose finalizer write failed
            Err(ApiError::NotFound) => {
                info!(cluster_id = %id, "Provider cluster already deleted")
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

async fn write_phase(cluster: &mut BridgeCluster, phase: ClusterPhase, ctx: &Context) -> Result<()> {
    let from = cluster.phase_str().to_string();
    let status = cluster.status.get_or_insert_with(Default::default);
    set_phase(status, phase);
    *cluster = ctx.store.update_status(cluster).await?;

    info!("Phase {} -> {}", display_phase(&from), phase);
    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_transition(display_phase(&from), phase.as_str());
    }
    Ok(())
}

fn display_phase(raw: &str) -> &str {
    if raw.is_empty() {
        ClusterPhase::Unknown.as_str()
    } else {
        raw
    }
}

async fn create_cluster(cluster: &BridgeCluster, ctx: &Context) -> Result<()> {
    let team_id = match spec_team_id(&cluster.spec).or(ctx.team_id.as_deref()) {
        Some(team_id) => team_id.to_string(),
        None => ctx.bridge.default_team_id().await?,
    };

    let request = create_request(&cluster.spec, &team_id);
    match ctx.bridge.create_cluster(&request).await {
        Ok(()) => {
            info!(cluster = %request.name, team_id = %team_id, "Requested cluster creation");
            Ok(())
        }
        // Same-named cluster already exists, most likely from an earlier attempt
        Err(ApiError::Conflict(message)) => {
            info!(cluster = %request.name, "Cluster already exists: {}", message);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn observe_cluster(cluster: &mut BridgeCluster, ctx: &Context) -> Result<()> {
    let detail = match cluster.cluster_id() {
        Some(id) => ctx.bridge.cluster_detail(id).await?,
        None => ctx.bridge.cluster_by_name(&cluster.spec.name).await?,
    };
    if detail.is_empty() {
        debug!(cluster = %cluster.spec.name, "Cluster not listed by provider yet");
        return Ok(());
    }

    let mut status = cluster.status.clone().unwrap_or_default();
    mirror_detail(&mut status, &detail)?;

    match ctx.bridge.default_conn_role(&detail.id).await {
        Ok(role) => {
            if let Err(e) = apply_connection_role(&mut status, &role) {
                warn!(cluster_id = %detail.id, "Ignoring connection role: {}", e);
            }
        }
        Err(e) => warn!(cluster_id = %detail.id, "Unable to get connection role: {}", e),
    }

    let from = status.phase.clone();
    if detail.is_ready() {
        let sm = ClusterStateMachine::new();
        if let TransitionResult::Success { to, description, .. } =
            sm.transition(ClusterPhase::Creating, ClusterEvent::ProviderReady)
        {
            info!(cluster_id = %detail.id, "{}", description);
            status.phase = to.as_str().to_string();
        }
    }
    stamp(&mut status);

    let promoted = status.phase != from;
    cluster.status = Some(status);
    *cluster = ctx.store.update_status(cluster).await?;

    if promoted && let Some(health) = &ctx.health {
        health
            .metrics
            .record_transition(display_phase(&from), ClusterPhase::Ready.as_str());
    }
    Ok(())
}
