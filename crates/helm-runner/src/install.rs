//! Install driver
//!
//! Builds and executes one chart installation against a running release
//! backend. The invocation is pointed at the session's service port through
//! the environment, stdout passes through, stderr is captured for
//! classification and diagnostics. No retry happens here; retry is the
//! scheduler's requeue concern.

use crate::error::HelmError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable pointing the install client at the backend session
const HELM_HOST_ENV: &str = "HELM_HOST";
/// Environment variable pointing the install client at its local home
const HELM_HOME_ENV: &str = "HELM_HOME";
/// Benign secondary message a failed-then-retried first install emits,
/// masking the original error text.
const MASKED_RETRY_MSG: &str = "has no deployed releases";

/// Chart coordinates for one install.
#[derive(Debug, Clone)]
pub struct ChartSource {
    /// Chart repository URL
    pub repository_url: String,
    /// Chart reference within the repository
    pub chart_reference: String,
    /// Version pin; latest when unset
    pub version: Option<String>,
    /// Release name; the tool generates one when unset
    pub release_name: Option<String>,
}

/// Flattens an answer mapping into the single `--set` value.
///
/// Produces `key=value` pairs joined by commas, `None` for an empty map.
/// Iteration order is an implementation detail consumers must not rely on;
/// the pairs themselves are recoverable for any keys and values free of
/// `=` and `,`.
pub fn flatten_answers(answers: &BTreeMap<String, String>) -> Option<String> {
    if answers.is_empty() {
        return None;
    }
    let joined = answers
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    Some(joined)
}

/// Drives the external install client binary.
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    helm_home: PathBuf,
}

impl HelmCli {
    /// Creates a driver around the given client binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            helm_home: PathBuf::from(".helm"),
        }
    }

    /// Overrides the client home directory (`HELM_HOME`).
    pub fn with_home(mut self, helm_home: impl Into<PathBuf>) -> Self {
        self.helm_home = helm_home.into();
        self
    }

    /// Initializes the client side only, no server components. Run once
    /// before the first install of a reconciliation attempt.
    pub async fn init_client(&self) -> Result<(), HelmError> {
        debug!("initializing install client");
        let output = Command::new(&self.binary)
            .arg("init")
            .arg("--client-only")
            .env(HELM_HOME_ENV, &self.helm_home)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HelmError::InstallSpawn {
                binary: self.binary.display().to_string(),
                source,
            })?
            .wait_with_output()
            .await
            .map_err(|source| HelmError::InstallSpawn {
                binary: self.binary.display().to_string(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(classify_failure(&output))
        }
    }

    /// Argument vector for one install invocation.
    pub fn install_args(
        chart: &ChartSource,
        answers: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "--repo".to_string(),
            chart.repository_url.clone(),
            chart.chart_reference.clone(),
        ];
        if let Some(version) = &chart.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if let Some(release_name) = &chart.release_name {
            args.push("--name".to_string());
            args.push(release_name.clone());
        }
        if let Some(set_values) = flatten_answers(answers) {
            args.push("--set".to_string());
            args.push(set_values);
        }
        args
    }

    /// Performs one chart installation against the session listening on
    /// `service_port`. Exit code is the sole success signal.
    pub async fn install(
        &self,
        chart: &ChartSource,
        answers: &BTreeMap<String, String>,
        service_port: u16,
    ) -> Result<(), HelmError> {
        let args = Self::install_args(chart, answers);
        info!(
            "installing chart {} from {} via port {service_port}",
            chart.chart_reference, chart.repository_url
        );
        let output = Command::new(&self.binary)
            .args(&args)
            .env(HELM_HOST_ENV, format!("127.0.0.1:{service_port}"))
            .env(HELM_HOME_ENV, &self.helm_home)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HelmError::InstallSpawn {
                binary: self.binary.display().to_string(),
                source,
            })?
            .wait_with_output()
            .await
            .map_err(|source| HelmError::InstallSpawn {
                binary: self.binary.display().to_string(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(classify_failure(&output))
        }
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

/// Classifies a non-zero exit, labeling the known benign retry artifact so
/// it is never mistaken for the root cause, while still surfacing it.
fn classify_failure(output: &std::process::Output) -> HelmError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    HelmError::Install {
        status: output.status.code(),
        masked_retry_artifact: stderr.contains(MASKED_RETRY_MSG),
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ChartSource {
        ChartSource {
            repository_url: "https://charts.example.com".to_string(),
            chart_reference: "app".to_string(),
            version: None,
            release_name: None,
        }
    }

    #[test]
    fn test_install_args_without_version_or_answers() {
        let args = HelmCli::install_args(&chart(), &BTreeMap::new());
        assert_eq!(
            args,
            vec!["install", "--repo", "https://charts.example.com", "app"]
        );
    }

    #[test]
    fn test_install_args_with_version_pin_and_release_name() {
        let mut chart = chart();
        chart.version = Some("1.2.3".to_string());
        chart.release_name = Some("frontend".to_string());
        let args = HelmCli::install_args(&chart, &BTreeMap::new());
        assert_eq!(
            args,
            vec![
                "install",
                "--repo",
                "https://charts.example.com",
                "app",
                "--version",
                "1.2.3",
                "--name",
                "frontend",
            ]
        );
    }

    #[test]
    fn test_install_args_flatten_single_answer_exactly() {
        let answers = BTreeMap::from([("replicas".to_string(), "3".to_string())]);
        let args = HelmCli::install_args(&chart(), &answers);
        assert_eq!(args[args.len() - 2], "--set");
        assert_eq!(args[args.len() - 1], "replicas=3");
    }

    #[test]
    fn test_flatten_answers_is_a_bijection_on_pairs() {
        let answers = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two".to_string()),
            ("c.d".to_string(), "3".to_string()),
        ]);
        let joined = flatten_answers(&answers).unwrap();
        let recovered: BTreeMap<String, String> = joined
            .split(',')
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap();
                (key.to_string(), value.to_string())
            })
            .collect();
        assert_eq!(recovered, answers);
    }

    #[test]
    fn test_flatten_answers_empty_map_yields_no_flag() {
        assert_eq!(flatten_answers(&BTreeMap::new()), None);
        let args = HelmCli::install_args(&chart(), &BTreeMap::new());
        assert!(!args.contains(&"--set".to_string()));
    }

    #[cfg(unix)]
    mod stub {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// Writes a stub client that records its argv and HELM_HOST to a
        /// file, then exits with the given code and stderr text.
        fn write_stub(dir: &std::path::Path, exit_code: i32, stderr_text: &str) -> std::path::PathBuf {
            let script = dir.join("fake-helm");
            let record = dir.join("invocation");
            let mut file = std::fs::File::create(&script).unwrap();
            writeln!(
                file,
                "#!/bin/sh\necho \"$@\" > '{record}'\necho \"HELM_HOST=$HELM_HOST\" >> '{record}'\n[ -n '{stderr}' ] && echo '{stderr}' >&2\nexit {code}",
                record = record.display(),
                stderr = stderr_text,
                code = exit_code,
            )
            .unwrap();
            drop(file);
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        #[tokio::test]
        async fn test_install_points_at_the_session_port_via_env() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), 0, "");
            let cli = HelmCli::new(&script);
            let answers = BTreeMap::from([("replicas".to_string(), "3".to_string())]);

            cli.install(&chart(), &answers, 45678).await.unwrap();

            let recorded = std::fs::read_to_string(dir.path().join("invocation")).unwrap();
            assert!(recorded.contains("install --repo https://charts.example.com app --set replicas=3"));
            assert!(recorded.contains("HELM_HOST=127.0.0.1:45678"));
        }

        #[tokio::test]
        async fn test_nonzero_exit_classifies_as_install_failure() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), 1, "error: chart not found");
            let cli = HelmCli::new(&script);

            let err = cli.install(&chart(), &BTreeMap::new(), 45679).await;
            match err {
                Err(HelmError::Install {
                    status,
                    stderr,
                    masked_retry_artifact,
                }) => {
                    assert_eq!(status, Some(1));
                    assert!(stderr.contains("chart not found"));
                    assert!(!masked_retry_artifact);
                }
                other => panic!("expected Install error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_retry_artifact_is_labeled_but_still_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), 1, "Error: \"app\" has no deployed releases");
            let cli = HelmCli::new(&script);

            let err = cli.install(&chart(), &BTreeMap::new(), 45680).await.unwrap_err();
            assert!(err.is_masked_retry_artifact());
            assert!(matches!(err, HelmError::Install { .. }));
        }

        #[tokio::test]
        async fn test_missing_binary_is_a_spawn_failure() {
            let cli = HelmCli::new("/nonexistent/helm-binary");
            let err = cli.install(&chart(), &BTreeMap::new(), 45681).await;
            assert!(matches!(err, Err(HelmError::InstallSpawn { .. })));
        }

        #[tokio::test]
        async fn test_init_client_runs_client_only() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), 0, "");
            let cli = HelmCli::new(&script).with_home(dir.path().join(".helm"));

            cli.init_client().await.unwrap();

            let recorded = std::fs::read_to_string(dir.path().join("invocation")).unwrap();
            assert!(recorded.contains("init --client-only"));
        }
    }
}
