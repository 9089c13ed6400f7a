//! Kubernetes resource watchers.
//!
//! EdgeMachine and EdgeCluster are each driven by a `kube_runtime::Controller`
//! through the generic `watch_resource()` helper, which maps [`Reconciled`]
//! onto requeue actions and applies per-record Fibonacci backoff on errors.

use crate::error::ControllerError;
use crate::reconciler::{Reconciled, Reconciler, WAIT_REQUEUE};
use crds::{EdgeCluster, EdgeMachine};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::{Controller, controller::{Action, Config as ControllerConfig}, watcher};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Reconciled, ControllerError>> + Send>>;

/// Backoff key of a record
fn backoff_key<K: kube::Resource>(resource_name: &str, obj: &K) -> String {
    format!(
        "{}/{}/{}",
        resource_name,
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Translate a reconciliation outcome into a controller action
pub fn action_for(outcome: Reconciled) -> Action {
    match outcome {
        Reconciled::Done => Action::await_change(),
        Reconciled::Requeue => Action::requeue(WAIT_REQUEUE),
    }
}

/// Generic watcher helper around kube_runtime::Controller.
///
/// The controller handles reconnection and keeps watching indefinitely;
/// failed reconciliations are retried after the record's next backoff delay.
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = backoff_key(resource_name, obj.as_ref());
        let delay = ctx.backoff.next_for(&key);
        error!("Reconciliation error for {}: {} (retrying in {:?})", key, error, delay);
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let key = backoff_key(resource_name, obj.as_ref());
        async move {
            debug!("Reconciling {}", key);
            let outcome = reconcile_fn(ctx.clone(), obj).await?;
            ctx.backoff.reset(&key);
            Ok::<Action, ControllerError>(action_for(outcome))
        }
    };

    // Debounce batches bursts of status writes into one reconciliation
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches edge machines and clusters.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    edge_machine_api: Api<EdgeMachine>,
    edge_cluster_api: Api<EdgeCluster>,
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        edge_machine_api: Api<EdgeMachine>,
        edge_cluster_api: Api<EdgeCluster>,
    ) -> Self {
        Self {
            reconciler,
            edge_machine_api,
            edge_cluster_api,
        }
    }

    pub async fn watch_edge_machines(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.edge_machine_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_edge_machine(&resource).await }),
            "EdgeMachine",
        )
        .await
    }

    pub async fn watch_edge_clusters(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.edge_cluster_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_edge_cluster(&resource).await }),
            "EdgeCluster",
        )
        .await
    }
}
