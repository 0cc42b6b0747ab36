//! Main controller implementation.
//!
//! This module contains the `Controller` struct that orchestrates
//! reconciliation and resource watching for the MultiClusterApp controller.

use crate::error::ControllerError;
use crate::reconciler::{FailurePolicy, Reconciler};
use crate::watcher::Watcher;
use crds::MultiClusterApp;
use helm_runner::{HelmCli, TillerBackend};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for MultiClusterApp deployment.
pub struct Controller {
    app_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        tiller_bin: String,
        helm_bin: String,
        helm_home: String,
        failure_policy: FailurePolicy,
        namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing MultiClusterApp Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await.map_err(ControllerError::Kube)?;

        let ns = namespace.as_deref().unwrap_or("default");
        let app_api: Api<MultiClusterApp> = Api::namespaced(kube_client, ns);

        // Create reconciler around the process-backed release backend
        let backend = Box::new(TillerBackend::new(tiller_bin));
        let helm = HelmCli::new(helm_bin).with_home(helm_home);
        let reconciler = Arc::new(Reconciler::new(
            app_api.clone(),
            backend,
            helm,
            failure_policy,
        ));

        // Start watcher in a background task
        let watcher_instance = Watcher::new(reconciler, app_api);
        let app_watcher = tokio::spawn(async move { watcher_instance.watch_apps().await });

        Ok(Self { app_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("MultiClusterApp Controller running");

        (&mut self.app_watcher)
            .await
            .map_err(|e| {
                ControllerError::Watch(format!("MultiClusterApp watcher panicked: {e}"))
            })?
            .map_err(|e| ControllerError::Watch(format!("MultiClusterApp watcher error: {e}")))?;

        Ok(())
    }
}
