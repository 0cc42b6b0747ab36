//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test resources and stub
//! external binaries.

use crds::{ClusterConfig, MultiClusterApp, MultiClusterAppSpec, Target};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Helper to create a test MultiClusterApp with the given targets
pub fn create_test_app(
    name: &str,
    namespace: &str,
    chart_repository_url: &str,
    targets: Vec<Target>,
) -> MultiClusterApp {
    MultiClusterApp {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: MultiClusterAppSpec {
            chart_repository_url: chart_repository_url.to_string(),
            chart_reference: "app".to_string(),
            chart_version: None,
            release_name: None,
            release_namespace: Some("apps".to_string()),
            targets,
        },
        status: None,
    }
}

/// Helper to create a test MultiClusterApp marked for deletion
pub fn create_deleting_app(name: &str, namespace: &str) -> MultiClusterApp {
    let mut app = create_test_app(name, namespace, "https://charts.example.com", Vec::new());
    app.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    app
}

/// Helper to create a test target with answers
pub fn create_test_target(server: &str, answers: &[(&str, &str)]) -> Target {
    Target {
        cluster_config: ClusterConfig {
            server: server.to_string(),
            certificate_authority_data: Some("Y2EtZGF0YQ==".to_string()),
            client_certificate_data: Some("Y2VydA==".to_string()),
            client_key_data: Some("a2V5".to_string()),
        },
        answers: answers
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<String, String>>(),
    }
}

/// Writes a stub install client that records its argv and HELM_HOST, then
/// exits successfully. Returns the script path and the record file path.
pub fn write_stub_helm(dir: &Path) -> (PathBuf, PathBuf) {
    write_stub_helm_failing(dir, 0, "")
}

/// Same as [`write_stub_helm`] but with a configurable exit code and stderr
/// text, for exercising failure classification.
pub fn write_stub_helm_failing(
    dir: &Path,
    exit_code: i32,
    stderr_text: &str,
) -> (PathBuf, PathBuf) {
    let script = dir.join("fake-helm");
    let record = dir.join("helm-invocations");
    let mut file = std::fs::File::create(&script).unwrap();
    // `init --client-only` always succeeds so only install invocations can
    // be made to fail.
    writeln!(
        file,
        "#!/bin/sh\necho \"$@\" >> '{record}'\necho \"HELM_HOST=$HELM_HOST\" >> '{record}'\nif [ \"$1\" = \"init\" ]; then exit 0; fi\n[ -n '{stderr}' ] && echo '{stderr}' >&2\nexit {code}",
        record = record.display(),
        stderr = stderr_text,
        code = exit_code,
    )
    .unwrap();
    drop(file);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    (script, record)
}
