//! Main reconciler for PeeringServer resources
//!
//! Implements the controller pattern using kube-rs runtime: a level-triggered
//! loop that converges the owned ConfigMap, headless Service, and StatefulSet
//! on every observed change, then publishes status back to the resource.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{PeeringPhase, PeeringServer, PeeringServerStatus};
use crate::error::{Error, Result};

use super::resources;

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    /// Namespace whose PeeringServers this operator manages.
    pub namespace: String,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let namespace = state.namespace.clone();
    let servers: Api<PeeringServer> = Api::namespaced(client.clone(), &namespace);

    info!("Starting PeeringServer controller in namespace {namespace}");

    // Verify CRD exists
    match servers.list(&Default::default()).await {
        Ok(_) => info!("PeeringServer CRD is available"),
        Err(e) => {
            error!(
                "PeeringServer CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "PeeringServer CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(servers, Config::default())
        // Watch owned resources so external drift triggers a re-reconcile
        .owns::<ConfigMap>(
            Api::namespaced(client.clone(), &namespace),
            Config::default(),
        )
        .owns::<Service>(
            Api::namespaced(client.clone(), &namespace),
            Config::default(),
        )
        .owns::<StatefulSet>(
            Api::namespaced(client.clone(), &namespace),
            Config::default(),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The main reconciliation function
///
/// Called whenever a PeeringServer is created or updated, an owned resource
/// changes, or the requeue timer expires. Deletion needs no handling here:
/// owner references make the API server garbage-collect all owned objects.
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<PeeringServer>, ctx: Arc<ControllerState>) -> Result<Action> {
    let client = &ctx.client;
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    info!(
        "Reconciling PeeringServer {}/{} (replicas: {})",
        namespace, name, obj.spec.replicas
    );

    if let Err(reason) = obj.spec.validate() {
        warn!("Validation failed for {}/{}: {}", namespace, name, reason);
        // Surface the failure without touching any owned object.
        if let Err(patch_err) = patch_status(client, &obj, PeeringPhase::Failed, 0, 0).await {
            warn!(
                "Failed to patch status for {}/{}: {}",
                namespace, name, patch_err
            );
        }
        return Err(Error::ValidationError(reason));
    }

    match apply_owned_objects(client, &obj).await {
        Ok(()) => {
            let (replicas, ready_replicas) = observed_replicas(client, &obj).await;
            // Status is advisory; a failed patch never fails the reconcile.
            if let Err(patch_err) =
                patch_status(client, &obj, PeeringPhase::Running, replicas, ready_replicas).await
            {
                warn!(
                    "Failed to patch status for {}/{}: {}",
                    namespace, name, patch_err
                );
            }
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        Err(err) if err.is_conflict() => {
            // A stale write; the next watch event carries the fresh object.
            debug!(
                "Conflict while updating {}/{}, deferring to the next event",
                namespace, name
            );
            Err(err)
        }
        Err(err) => {
            let (replicas, ready_replicas) = observed_replicas(client, &obj).await;
            if let Err(patch_err) =
                patch_status(client, &obj, PeeringPhase::Failed, replicas, ready_replicas).await
            {
                warn!(
                    "Failed to patch status for {}/{}: {}",
                    namespace, name, patch_err
                );
            }
            Err(err)
        }
    }
}

/// Converge the owned objects, strictly ConfigMap, then Service, then
/// StatefulSet: a pod that starts must find its config already mounted and
/// its DNS identity already resolvable.
async fn apply_owned_objects(client: &Client, ps: &PeeringServer) -> Result<()> {
    resources::ensure_config_map(client, ps).await?;
    resources::ensure_service(client, ps).await?;
    resources::ensure_statefulset(client, ps).await?;
    Ok(())
}

/// Fetch observed replica counts from the owned StatefulSet's status.
async fn observed_replicas(client: &Client, ps: &PeeringServer) -> (i32, i32) {
    let namespace = ps.namespace().unwrap_or_else(|| "default".to_string());
    let name = ps.name_any();
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);

    match api.get(&name).await {
        Ok(statefulset) => {
            let status = statefulset.status.unwrap_or_default();
            (status.replicas, status.ready_replicas.unwrap_or(0))
        }
        Err(kube::Error::Api(e)) if e.code == 404 => (0, 0),
        Err(e) => {
            warn!("Failed to get StatefulSet {}/{}: {:?}", namespace, name, e);
            (0, 0)
        }
    }
}

/// Update the status subresource of a PeeringServer
async fn patch_status(
    client: &Client,
    ps: &PeeringServer,
    phase: PeeringPhase,
    replicas: i32,
    ready_replicas: i32,
) -> Result<()> {
    let namespace = ps.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<PeeringServer> = Api::namespaced(client.clone(), &namespace);

    let status = PeeringServerStatus {
        replicas,
        ready_replicas,
        phase,
        last_updated: Some(Utc::now().to_rfc3339()),
    };

    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &ps.name_any(),
        &PatchParams::apply("peering-operator"),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::KubeError)?;

    Ok(())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(ps: Arc<PeeringServer>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", ps.name_any(), error);

    // Retriable errors get a short retry; everything else (validation
    // included) waits for the next edit or the periodic requeue.
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(300)
    };

    Action::requeue(retry_duration)
}
