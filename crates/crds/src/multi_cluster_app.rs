//! MultiClusterApp CRD
//!
//! Describes a packaged Helm chart deployment intended for multiple clusters.
//! Each target carries its own cluster connection parameters and per-cluster
//! answer overrides; the controller drives one install per target.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "MultiClusterApp",
    namespaced,
    status = "MultiClusterAppStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterAppSpec {
    /// URL of the chart repository serving the packaged application.
    /// An empty value means the app has no chart source configured yet and
    /// reconciliation is a no-op.
    #[serde(default)]
    pub chart_repository_url: String,

    /// Chart reference within the repository (e.g. "wordpress")
    #[serde(default)]
    pub chart_reference: String,

    /// Chart version pin (latest when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,

    /// Release name passed to the install; helm generates one when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    /// Namespace the backend stores release state under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_namespace: Option<String>,

    /// Destination clusters, deployed in declaration order
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// One destination cluster plus its per-cluster overrides.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Connection parameters for the destination cluster
    pub cluster_config: ClusterConfig,

    /// Per-cluster override values ("answers"), flattened into the install
    /// invocation as `key=value` pairs. Keys are unique; order is irrelevant.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<String, String>,
}

/// Connection parameters for one cluster.
///
/// Certificate and key material is carried as opaque base64 blobs exactly as
/// found in a kubeconfig; nothing is decoded or resolved to paths here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// API server endpoint URL. Must be non-empty for credentials to be
    /// materialized for the target.
    #[serde(default)]
    pub server: String,

    /// Cluster CA bundle, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,

    /// Client certificate, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,

    /// Client key, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterAppStatus {
    /// Rolled-up health across targets
    pub health_state: HealthState,

    /// Per-target outcome of the most recent reconciliation attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetStatus>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Outcome of the most recent install attempt against one target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// Server URL identifying the target this entry belongs to
    pub server: String,

    /// Release name assigned to the install, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_release_name: Option<String>,

    /// Health of the release on this target
    pub health_state: HealthState,

    /// Error message from the last failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Deployment health state
///
/// Serializes as PascalCase ("Deployed", "Failed", etc.) but deserializes
/// both PascalCase and lowercase for backward compatibility with existing
/// CRs in the cluster.
#[serde(rename_all = "PascalCase")]
pub enum HealthState {
    /// No install attempted yet
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Install succeeded on every attempted target
    #[serde(alias = "deployed")]
    Deployed,

    /// Some targets succeeded, some failed
    #[serde(alias = "degraded")]
    Degraded,

    /// Install failed on every attempted target
    #[serde(alias = "failed")]
    Failed,
}
