//! Controller-specific error types.
//!
//! This module defines error types specific to the MultiClusterApp
//! controller that are not covered by upstream library errors.

use helm_runner::HelmError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the MultiClusterApp controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Release session error for a single target
    #[error("Release session error: {0}")]
    Helm(#[from] HelmError),

    /// One or more targets failed during a reconciliation attempt
    #[error("{} target(s) failed: {}", failures.len(), failures.join("; "))]
    TargetsFailed {
        /// One "server: error" entry per failed target
        failures: Vec<String>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
