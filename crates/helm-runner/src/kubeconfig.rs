//! Credential bundle materialization
//!
//! Renders a target cluster's connection parameters into a transient
//! kubeconfig file the release backend consumes via `KUBECONFIG`. One bundle
//! per target per reconciliation attempt, never shared; the owning `TempDir`
//! removes the plaintext secrets from disk when the bundle is dropped.

use crate::error::HelmError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name the single cluster and context entries are registered under
const DEFAULT_ENTRY: &str = "default";
/// Name of the single auth entry
const USER_ENTRY: &str = "user";
/// Fixed filename of the rendered bundle inside the namespace subdirectory
const KUBECONFIG_FILENAME: &str = "kubeconfig";

/// Connection parameters for one target cluster.
///
/// Certificate and key material is carried opaquely as base64 text, exactly
/// as it will appear in the rendered file; no decoding happens at this layer.
#[derive(Debug, Clone, Default)]
pub struct ClusterCredentials {
    /// API server endpoint URL; must be non-empty
    pub server: String,
    /// Cluster CA bundle, base64
    pub certificate_authority_data: Option<String>,
    /// Client certificate, base64
    pub client_certificate_data: Option<String>,
    /// Client key, base64
    pub client_key_data: Option<String>,
}

/// Minimal single-cluster, single-user client configuration document.
///
/// Always exactly one cluster, one context, one auth entry, with
/// `current-context` bound to the context's name.
#[derive(Debug, Serialize, Deserialize)]
pub struct Kubeconfig {
    /// Schema version, always "v1"
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Document kind, always "Config"
    pub kind: String,
    /// Name of the active context
    #[serde(rename = "current-context")]
    pub current_context: String,
    /// Cluster entries keyed by name
    pub clusters: BTreeMap<String, ClusterEntry>,
    /// Context entries keyed by name
    pub contexts: BTreeMap<String, ContextEntry>,
    /// Auth entries keyed by name
    pub users: BTreeMap<String, UserEntry>,
}

/// One cluster entry of the credential bundle.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterEntry {
    /// API server endpoint URL
    pub server: String,
    /// Cluster CA bundle, base64
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
}

/// One context entry binding a cluster to an auth entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Name of the cluster entry
    pub cluster: String,
    /// Name of the auth entry
    pub user: String,
}

/// One auth entry of the credential bundle.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserEntry {
    /// Client certificate, base64
    #[serde(
        rename = "client-certificate-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_certificate_data: Option<String>,
    /// Client key, base64
    #[serde(
        rename = "client-key-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_key_data: Option<String>,
}

impl Kubeconfig {
    /// Builds the single-cluster document for one target.
    pub fn for_cluster(credentials: &ClusterCredentials) -> Self {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            DEFAULT_ENTRY.to_string(),
            ClusterEntry {
                server: credentials.server.clone(),
                certificate_authority_data: credentials.certificate_authority_data.clone(),
            },
        );
        let mut contexts = BTreeMap::new();
        contexts.insert(
            DEFAULT_ENTRY.to_string(),
            ContextEntry {
                cluster: DEFAULT_ENTRY.to_string(),
                user: USER_ENTRY.to_string(),
            },
        );
        let mut users = BTreeMap::new();
        users.insert(
            USER_ENTRY.to_string(),
            UserEntry {
                client_certificate_data: credentials.client_certificate_data.clone(),
                client_key_data: credentials.client_key_data.clone(),
            },
        );
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            current_context: DEFAULT_ENTRY.to_string(),
            clusters,
            contexts,
            users,
        }
    }
}

/// A rendered credential bundle on local disk.
///
/// Owns the temporary directory the file lives in; dropping the bundle
/// removes the directory and the plaintext secrets with it.
#[derive(Debug)]
pub struct CredentialBundle {
    // Held for its Drop; the path below points inside it
    _dir: TempDir,
    path: PathBuf,
}

impl CredentialBundle {
    /// Absolute path of the rendered kubeconfig file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Materializes a credential bundle for one target.
///
/// Creates a uniquely-suffixed temporary directory with a namespace-scoped
/// subdirectory and writes the kubeconfig there. Failures are fatal for the
/// target; there is no retry at this layer.
pub fn write_kubeconfig(
    credentials: &ClusterCredentials,
    namespace: &str,
) -> Result<CredentialBundle, HelmError> {
    if credentials.server.is_empty() {
        return Err(HelmError::MissingServer);
    }

    let dir = tempfile::Builder::new()
        .prefix("kubeconfig-")
        .tempdir()
        .map_err(|source| HelmError::CredentialWrite { source })?;

    let scoped = dir.path().join(namespace);
    fs::create_dir_all(&scoped).map_err(|source| HelmError::CredentialWrite { source })?;

    let rendered = serde_yaml::to_string(&Kubeconfig::for_cluster(credentials))
        .map_err(|source| HelmError::CredentialSerialize { source })?;

    let path = scoped.join(KUBECONFIG_FILENAME);
    fs::write(&path, rendered).map_err(|source| HelmError::CredentialWrite { source })?;

    Ok(CredentialBundle { _dir: dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> ClusterCredentials {
        ClusterCredentials {
            server: "https://cluster-a:6443".to_string(),
            certificate_authority_data: Some("Y2EtZGF0YQ==".to_string()),
            client_certificate_data: Some("Y2VydA==".to_string()),
            client_key_data: Some("a2V5".to_string()),
        }
    }

    #[test]
    fn test_bundle_parses_back_as_single_cluster_config() {
        let bundle = write_kubeconfig(&credentials(), "apps").unwrap();
        let raw = fs::read_to_string(bundle.path()).unwrap();
        let parsed: Kubeconfig = serde_yaml::from_str(&raw).unwrap();

        assert_eq!(parsed.clusters.len(), 1);
        assert_eq!(parsed.contexts.len(), 1);
        assert_eq!(parsed.users.len(), 1);
        assert_eq!(parsed.current_context, "default");
        assert!(parsed.contexts.contains_key(&parsed.current_context));

        let cluster = &parsed.clusters["default"];
        assert_eq!(cluster.server, "https://cluster-a:6443");
        assert_eq!(cluster.certificate_authority_data.as_deref(), Some("Y2EtZGF0YQ=="));
        let context = &parsed.contexts["default"];
        assert_eq!(context.cluster, "default");
        assert_eq!(context.user, "user");
        assert_eq!(parsed.users["user"].client_key_data.as_deref(), Some("a2V5"));
    }

    #[test]
    fn test_bundle_path_is_namespace_scoped() {
        let bundle = write_kubeconfig(&credentials(), "team-a").unwrap();
        assert!(bundle.path().ends_with("team-a/kubeconfig"));
        assert!(bundle.path().is_file());
    }

    #[test]
    fn test_rendered_keys_match_client_config_schema() {
        let bundle = write_kubeconfig(&credentials(), "apps").unwrap();
        let raw = fs::read_to_string(bundle.path()).unwrap();
        assert!(raw.contains("apiVersion: v1"));
        assert!(raw.contains("kind: Config"));
        assert!(raw.contains("current-context: default"));
        assert!(raw.contains("certificate-authority-data:"));
        assert!(raw.contains("client-certificate-data:"));
        assert!(raw.contains("client-key-data:"));
    }

    #[test]
    fn test_missing_server_is_rejected() {
        let creds = ClusterCredentials::default();
        assert!(matches!(
            write_kubeconfig(&creds, "apps"),
            Err(HelmError::MissingServer)
        ));
    }

    #[test]
    fn test_drop_removes_secrets_from_disk() {
        let bundle = write_kubeconfig(&credentials(), "apps").unwrap();
        let path = bundle.path().to_path_buf();
        assert!(path.exists());
        drop(bundle);
        assert!(!path.exists());
    }

    #[test]
    fn test_bundles_never_share_directories() {
        let a = write_kubeconfig(&credentials(), "apps").unwrap();
        let b = write_kubeconfig(&credentials(), "apps").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
