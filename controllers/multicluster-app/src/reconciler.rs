//! Reconciliation logic for MultiClusterApp resources.
//!
//! One `sync` drives the declared targets of an app toward the desired
//! release state: per target it materializes a credential bundle, stands up
//! an isolated release backend session on freshly allocated ports, waits for
//! the backend to accept connections, runs the install against it and tears
//! the session down. Outcomes are written back to the resource status, the
//! only feedback channel the controller owns.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use chrono::Utc;
use crds::{
    ClusterConfig, HealthState, MultiClusterApp, MultiClusterAppStatus, Target, TargetStatus,
};
use helm_runner::{
    BackendConfig, ChartSource, ClusterCredentials, HelmCli, HelmError, PortAllocator,
    ReleaseBackend, write_kubeconfig,
};
use kube::Api;
use kube::api::{Patch, PatchParams};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a backend session gets to bind its probe listener before the
/// target is aborted.
const BACKEND_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do with the remaining targets once one of them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the remaining targets after the first failure
    FailFast,
    /// Attempt every target and aggregate the failures
    #[default]
    ContinueAll,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "failfast" | "fail-fast" => Ok(Self::FailFast),
            "continue" | "continue-all" => Ok(Self::ContinueAll),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Why a reconciliation event required no work.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// Resource no longer exists
    Absent,
    /// Resource is marked for deletion
    Deleting,
    /// No chart source configured yet
    NoChartSource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Absent => write!(f, "resource is absent"),
            SkipReason::Deleting => write!(f, "resource is marked for deletion"),
            SkipReason::NoChartSource => write!(f, "no chart repository configured"),
        }
    }
}

/// Decides whether a resource needs reconciliation at all.
pub(crate) fn reconcilable(
    app: Option<&MultiClusterApp>,
) -> Result<&MultiClusterApp, SkipReason> {
    let Some(app) = app else {
        return Err(SkipReason::Absent);
    };
    if app.metadata.deletion_timestamp.is_some() {
        return Err(SkipReason::Deleting);
    }
    if app.spec.chart_repository_url.is_empty() {
        return Err(SkipReason::NoChartSource);
    }
    Ok(app)
}

/// Result of one install attempt against one target.
#[derive(Debug)]
pub(crate) struct TargetOutcome {
    /// Server URL identifying the target
    pub server: String,
    /// Release name recorded for the target, when one was configured
    pub release_name: Option<String>,
    /// Install result
    pub result: Result<(), HelmError>,
}

fn credentials_for(config: &ClusterConfig) -> ClusterCredentials {
    ClusterCredentials {
        server: config.server.clone(),
        certificate_authority_data: config.certificate_authority_data.clone(),
        client_certificate_data: config.client_certificate_data.clone(),
        client_key_data: config.client_key_data.clone(),
    }
}

/// Runs the full pipeline for one target: credentials, backend session,
/// readiness, install, teardown. The credential bundle lives exactly as
/// long as this scope.
async fn deploy_target(
    namespace: &str,
    chart: &ChartSource,
    release_namespace: Option<&str>,
    target: &Target,
    backend: &dyn ReleaseBackend,
    helm: &HelmCli,
    ports: &mut PortAllocator,
) -> Result<(), HelmError> {
    let bundle = write_kubeconfig(&credentials_for(&target.cluster_config), namespace)?;
    debug!("credential bundle for {} at {:?}", target.cluster_config.server, bundle.path());

    let session = backend
        .start(BackendConfig {
            listen_port: ports.allocate()?,
            probe_port: ports.allocate()?,
            release_namespace: release_namespace.map(str::to_string),
            kubeconfig_path: bundle.path().to_path_buf(),
        })
        .await?;

    let result = match session.wait_ready(BACKEND_READY_TIMEOUT).await {
        Ok(()) => helm.install(chart, &target.answers, session.service_port()).await,
        Err(not_ready) => Err(not_ready),
    };

    // Teardown is unconditional; a kill failure is best-effort and never
    // overrides the install result.
    if let Err(termination) = session.stop().await {
        warn!(
            "failed to tear down release backend for {}: {termination}",
            target.cluster_config.server
        );
    }
    result
}

/// Deploys every declared target in order, honoring the failure policy.
///
/// Under [`FailurePolicy::FailFast`] the first failing target aborts the
/// rest for this attempt; they are re-attempted from scratch on the next
/// event, like every other target, since no per-target completion state
/// survives a run.
pub(crate) async fn deploy_targets(
    app: &MultiClusterApp,
    backend: &dyn ReleaseBackend,
    helm: &HelmCli,
    policy: FailurePolicy,
) -> Result<Vec<TargetOutcome>, HelmError> {
    let spec = &app.spec;
    if spec.targets.is_empty() {
        return Ok(Vec::new());
    }
    let namespace = app.metadata.namespace.as_deref().unwrap_or("default");
    let chart = ChartSource {
        repository_url: spec.chart_repository_url.clone(),
        chart_reference: spec.chart_reference.clone(),
        version: spec.chart_version.clone(),
        release_name: spec.release_name.clone(),
    };

    helm.init_client().await?;

    let mut ports = PortAllocator::new();
    let mut outcomes = Vec::with_capacity(spec.targets.len());
    for target in &spec.targets {
        let server = target.cluster_config.server.clone();
        let result = deploy_target(
            namespace,
            &chart,
            spec.release_namespace.as_deref(),
            target,
            backend,
            helm,
            &mut ports,
        )
        .await;
        if let Err(err) = &result {
            warn!("target {server} failed: {err}");
        }
        let failed = result.is_err();
        outcomes.push(TargetOutcome {
            server,
            release_name: spec.release_name.clone(),
            result,
        });
        if failed && policy == FailurePolicy::FailFast {
            debug!("fail-fast policy: skipping remaining targets");
            break;
        }
    }
    Ok(outcomes)
}

/// Rolls per-target outcomes up into the resource status.
pub(crate) fn build_status(outcomes: &[TargetOutcome]) -> MultiClusterAppStatus {
    let targets: Vec<TargetStatus> = outcomes
        .iter()
        .map(|outcome| TargetStatus {
            server: outcome.server.clone(),
            // A release name is only recorded once an install succeeded
            chart_release_name: outcome
                .result
                .is_ok()
                .then(|| outcome.release_name.clone())
                .flatten(),
            health_state: if outcome.result.is_ok() {
                HealthState::Deployed
            } else {
                HealthState::Failed
            },
            error: outcome.result.as_ref().err().map(ToString::to_string),
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let health_state = if outcomes.is_empty() {
        HealthState::Pending
    } else if failed == 0 {
        HealthState::Deployed
    } else if failed == outcomes.len() {
        HealthState::Failed
    } else {
        HealthState::Degraded
    };

    MultiClusterAppStatus {
        health_state,
        targets,
        last_reconciled: Some(Utc::now()),
    }
}

/// Folds failed outcomes into one reconciliation error, `None` when every
/// attempted target succeeded.
pub(crate) fn aggregate_failures(outcomes: &[TargetOutcome]) -> Option<ControllerError> {
    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|err| format!("{}: {err}", outcome.server))
        })
        .collect();
    if failures.is_empty() {
        None
    } else {
        Some(ControllerError::TargetsFailed { failures })
    }
}

/// Reconciles MultiClusterApp resources.
pub struct Reconciler {
    app_api: Api<MultiClusterApp>,
    backend: Box<dyn ReleaseBackend>,
    helm: HelmCli,
    failure_policy: FailurePolicy,
    /// Requeue backoff per resource (namespace/name -> state)
    backoff_states: Arc<Mutex<HashMap<String, FibonacciBackoff>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        app_api: Api<MultiClusterApp>,
        backend: Box<dyn ReleaseBackend>,
        helm: HelmCli,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            app_api,
            backend,
            helm,
            failure_policy,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciles one resource event.
    ///
    /// An absent resource, a deletion in progress or a missing chart source
    /// means there is nothing to do and the call succeeds without touching
    /// any target. Otherwise targets are deployed in declaration order and
    /// the per-target outcomes are patched into the resource status before
    /// any aggregated error is returned.
    pub async fn sync(
        &self,
        key: &str,
        app: Option<&MultiClusterApp>,
    ) -> Result<(), ControllerError> {
        let app = match reconcilable(app) {
            Ok(app) => app,
            Err(reason) => {
                debug!("Nothing to do for {key}: {reason}");
                return Ok(());
            }
        };

        info!(
            "Reconciling MultiClusterApp {key} ({} targets)",
            app.spec.targets.len()
        );
        let outcomes =
            deploy_targets(app, self.backend.as_ref(), &self.helm, self.failure_policy).await?;

        let status_result = self.update_status(app, build_status(&outcomes)).await;

        match aggregate_failures(&outcomes) {
            Some(failed) => Err(failed),
            None => {
                status_result?;
                self.reset_backoff(key);
                Ok(())
            }
        }
    }

    /// Next requeue delay for a failed resource, advancing its backoff.
    pub fn requeue_after(&self, key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => states.entry(key.to_string()).or_default().next_delay(),
            Err(e) => {
                warn!("Failed to lock backoff states: {e}, using default requeue");
                Duration::from_secs(60)
            }
        }
    }

    /// Restarts the backoff of a successfully reconciled resource.
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }

    /// Patches the per-target outcomes into the status subresource.
    async fn update_status(
        &self,
        app: &MultiClusterApp,
        status: MultiClusterAppStatus,
    ) -> Result<(), ControllerError> {
        let name = app.metadata.name.as_deref().ok_or_else(|| {
            ControllerError::InvalidConfig("MultiClusterApp missing name".to_string())
        })?;
        let namespace = app.metadata.namespace.as_deref().unwrap_or("default");

        let status_patch = serde_json::json!({ "status": status });
        let pp = PatchParams::default();
        match self
            .app_api
            .patch_status(name, &pp, &Patch::Merge(&status_patch))
            .await
        {
            Ok(_) => {
                info!("Updated MultiClusterApp {}/{} status", namespace, name);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to update MultiClusterApp {}/{} status: {}",
                    namespace, name, e
                );
                Err(ControllerError::Kube(e))
            }
        }
    }
}
