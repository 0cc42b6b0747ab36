//! MultiClusterApp Controller
//!
//! Deploys a packaged Helm chart onto a set of independently-configured
//! target clusters.
//!
//! This controller reconciles `MultiClusterApp` CRDs: for each declared
//! target it materializes transient cluster credentials, launches an
//! isolated per-release backend process on ephemeral ports, runs the chart
//! install against it and tears the backend down, writing per-target
//! outcomes back to the resource status.

mod backoff;
mod controller;
mod error;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::reconciler::FailurePolicy;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting MultiClusterApp Controller");

    // Load configuration from environment variables
    let tiller_bin = env::var("TILLER_BIN").unwrap_or_else(|_| "tiller".to_string());
    let helm_bin = env::var("HELM_BIN").unwrap_or_else(|_| "helm".to_string());
    let helm_home = env::var("HELM_HOME").unwrap_or_else(|_| ".helm".to_string());
    let failure_policy = match env::var("FAILURE_POLICY") {
        Ok(value) => value
            .parse::<FailurePolicy>()
            .map_err(ControllerError::InvalidConfig)?,
        Err(_) => FailurePolicy::default(),
    };
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Tiller binary: {}", tiller_bin);
    info!("  Helm binary: {}", helm_bin);
    info!("  Helm home: {}", helm_home);
    info!("  Failure policy: {:?}", failure_policy);
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));

    // Initialize and run controller
    let controller =
        Controller::new(tiller_bin, helm_bin, helm_home, failure_policy, namespace).await?;
    controller.run().await?;

    Ok(())
}
