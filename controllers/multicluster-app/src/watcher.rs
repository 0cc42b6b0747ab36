//! Kubernetes resource watcher.
//!
//! Wires the reconciler into `kube_runtime::Controller`, which delivers
//! events per resource key with single-flight semantics: one resource is
//! never reconciled reentrantly, while distinct resources reconcile
//! concurrently up to the configured limit.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::MultiClusterApp;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Periodic resync after a successful reconciliation
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Watches MultiClusterApp resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    app_api: Api<MultiClusterApp>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, app_api: Api<MultiClusterApp>) -> Self {
        Self {
            reconciler,
            app_api,
        }
    }

    /// Starts watching MultiClusterApp resources.
    ///
    /// Runs indefinitely: the Controller handles reconnection and retries,
    /// requeues failures with the reconciler's per-resource backoff and
    /// resyncs successful resources periodically.
    pub async fn watch_apps(&self) -> Result<(), ControllerError> {
        info!("Starting MultiClusterApp watcher");

        let error_policy =
            |app: Arc<MultiClusterApp>, err: &ControllerError, ctx: Arc<Reconciler>| {
                let key = resource_key(&app);
                let delay = ctx.requeue_after(&key);
                error!("Reconciliation error for {key}: {err}, requeueing in {delay:?}");
                Action::requeue(delay)
            };

        let reconcile = |app: Arc<MultiClusterApp>, ctx: Arc<Reconciler>| async move {
            let key = resource_key(&app);
            debug!("Reconciling MultiClusterApp {key}");
            ctx.sync(&key, Some(&app)).await?;
            Ok(Action::requeue(RESYNC_INTERVAL))
        };

        // Debounce batches bursts of status updates; the concurrency limit
        // bounds how many distinct apps deploy at once (each may hold ports
        // and subprocesses for several targets).
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        Controller::new(self.app_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .run(reconcile, error_policy, Arc::clone(&self.reconciler))
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!("Controller error: {e:?}");
                }
            })
            .await;

        Ok(())
    }
}

fn resource_key(app: &MultiClusterApp) -> String {
    format!(
        "{}/{}",
        app.metadata.namespace.as_deref().unwrap_or("default"),
        app.metadata.name.as_deref().unwrap_or("<unknown>")
    )
}
