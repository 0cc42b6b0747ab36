//! Helm runner errors

use std::time::Duration;
use thiserror::Error;

/// Errors produced while driving a per-target release session.
#[derive(Debug, Error)]
pub enum HelmError {
    /// Cluster config has no server endpoint, so no credential bundle can
    /// be materialized for the target.
    #[error("cluster config has no server endpoint")]
    MissingServer,

    /// Credential bundle directory or file could not be written
    #[error("failed to write cluster credentials: {source}")]
    CredentialWrite {
        #[source]
        source: std::io::Error,
    },

    /// Credential bundle could not be serialized
    #[error("failed to serialize cluster credentials: {source}")]
    CredentialSerialize {
        #[source]
        source: serde_yaml::Error,
    },

    /// No free port found within the allocation attempt cap
    #[error("no free port found after {attempts} attempts")]
    PortExhausted {
        /// Number of probe-bind attempts made before giving up
        attempts: u32,
    },

    /// Release backend binary could not be spawned
    #[error("failed to spawn release backend {binary}: {source}")]
    BackendSpawn {
        /// Binary the spawn was attempted with
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Release backend never accepted a probe connection
    #[error("release backend not ready on port {port} after {waited:?}")]
    BackendNotReady {
        /// Probe port that was polled
        port: u16,
        /// Total time spent polling
        waited: Duration,
    },

    /// Kill-on-cancel failed; best-effort, never overrides an install result
    #[error("failed to terminate release backend: {source}")]
    BackendTermination {
        #[source]
        source: std::io::Error,
    },

    /// Install binary could not be spawned
    #[error("failed to spawn {binary}: {source}")]
    InstallSpawn {
        /// Binary the spawn was attempted with
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Install process exited non-zero
    #[error("chart install failed (exit {status:?}): {stderr}")]
    Install {
        /// Exit code of the install process, if it exited normally
        status: Option<i32>,
        /// Captured standard-error text of the install process
        stderr: String,
        /// True when stderr carries the benign "has no deployed releases"
        /// message that a failed-then-retried first install emits. The error
        /// is still surfaced; this flag lets consumers tell the secondary
        /// artifact apart from a root cause.
        masked_retry_artifact: bool,
    },
}

impl HelmError {
    /// Whether this is an install failure carrying the known benign
    /// secondary message of the backend's internal retry logic.
    pub fn is_masked_retry_artifact(&self) -> bool {
        matches!(
            self,
            HelmError::Install {
                masked_retry_artifact: true,
                ..
            }
        )
    }
}
