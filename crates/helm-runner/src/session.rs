//! Release backend sessions
//!
//! Supervises one per-target backend process speaking the release-management
//! protocol. The backend is launched bound to freshly allocated ports and a
//! credential bundle, watched by a dedicated task, and killed as soon as the
//! owning session is cancelled or dropped. Termination is kill-on-cancel;
//! there is no graceful drain.

use crate::error::HelmError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Environment variable the backend reads its credential bundle from
const KUBECONFIG_ENV: &str = "KUBECONFIG";
/// Environment variable carrying the release namespace, set only when one is configured
const NAMESPACE_ENV: &str = "TILLER_NAMESPACE";
/// Interval between readiness probe connection attempts
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launch parameters for one backend session.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Port the backend serves the release protocol on
    pub listen_port: u16,
    /// Port the backend serves its liveness probe on
    pub probe_port: u16,
    /// Namespace the backend stores release state under
    pub release_namespace: Option<String>,
    /// Path to the credential bundle the backend authenticates with
    pub kubeconfig_path: PathBuf,
}

/// Narrow seam for standing up a release backend, so the backend technology
/// is swappable and reconciliation logic can be tested against a mock.
#[async_trait]
pub trait ReleaseBackend: Send + Sync {
    /// Launches a backend session. Returns once the process is spawned;
    /// readiness is established separately via [`BackendSession::wait_ready`].
    async fn start(&self, config: BackendConfig) -> Result<BackendSession, HelmError>;
}

/// A live backend session: the supervised process plus its network identity.
///
/// The session owns a cancellation token. Cancelling (via [`stop`] or drop)
/// kills the process synchronously; a natural process exit releases the
/// supervision task on its own.
///
/// [`stop`]: BackendSession::stop
#[derive(Debug)]
pub struct BackendSession {
    service_port: u16,
    probe_port: u16,
    cancel: CancellationToken,
    supervisor: JoinHandle<Result<(), HelmError>>,
}

impl BackendSession {
    pub(crate) fn supervised(
        service_port: u16,
        probe_port: u16,
        cancel: CancellationToken,
        supervisor: JoinHandle<Result<(), HelmError>>,
    ) -> Self {
        Self {
            service_port,
            probe_port,
            cancel,
            supervisor,
        }
    }

    /// Port the release protocol is served on.
    pub fn service_port(&self) -> u16 {
        self.service_port
    }

    /// Port the liveness probe is served on.
    pub fn probe_port(&self) -> u16 {
        self.probe_port
    }

    /// Blocks until the backend accepts a connection on its probe port.
    ///
    /// An install must not be issued before this returns: the backend binds
    /// its listener asynchronously after spawn, and nothing else orders the
    /// install after the bind.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), HelmError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let addr = SocketAddr::from(([127, 0, 0, 1], self.probe_port));
        loop {
            if TcpStream::connect(addr).await.is_ok() {
                debug!("release backend ready on probe port {}", self.probe_port);
                return Ok(());
            }
            // A finished supervisor means the process already exited; the
            // probe port will never open.
            if self.supervisor.is_finished() || Instant::now() >= deadline {
                return Err(HelmError::BackendNotReady {
                    port: self.probe_port,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Cancels the session, kills the process and waits for supervision to
    /// finish. Returns the kill error, if any; callers treat it as
    /// best-effort and never let it override an install result.
    pub async fn stop(mut self) -> Result<(), HelmError> {
        self.cancel.cancel();
        match (&mut self.supervisor).await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(HelmError::BackendTermination {
                source: std::io::Error::other(join_error),
            }),
        }
    }
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        // Covers early returns in the per-target flow; the child itself is
        // also spawned with kill_on_drop.
        self.cancel.cancel();
    }
}

/// Process-backed release backend launching a `tiller` binary.
#[derive(Debug, Clone)]
pub struct TillerBackend {
    binary: PathBuf,
}

impl TillerBackend {
    /// Creates a backend launching the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TillerBackend {
    fn default() -> Self {
        Self::new("tiller")
    }
}

#[async_trait]
impl ReleaseBackend for TillerBackend {
    async fn start(&self, config: BackendConfig) -> Result<BackendSession, HelmError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--listen")
            .arg(format!(":{}", config.listen_port))
            .arg("--probe")
            .arg(format!(":{}", config.probe_port))
            .env(KUBECONFIG_ENV, &config.kubeconfig_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(namespace) = config
            .release_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
        {
            cmd.env(NAMESPACE_ENV, namespace);
        }

        let mut child = cmd.spawn().map_err(|source| HelmError::BackendSpawn {
            binary: self.binary.display().to_string(),
            source,
        })?;
        debug!(
            "spawned release backend pid {:?} on ports {}/{}",
            child.id(),
            config.listen_port,
            config.probe_port
        );

        // Forward the backend's streams into the log for diagnostics
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("backend stdout: {line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("backend stderr: {line}");
                }
            });
        }

        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let supervisor = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("release backend session cancelled, killing pid {:?}", child.id());
                    child
                        .kill()
                        .await
                        .map_err(|source| HelmError::BackendTermination { source })
                }
                status = child.wait() => match status {
                    Ok(status) => {
                        debug!("release backend exited on its own: {status}");
                        Ok(())
                    }
                    Err(source) => Err(HelmError::BackendTermination { source }),
                },
            }
        });

        Ok(BackendSession::supervised(
            config.listen_port,
            config.probe_port,
            cancel,
            supervisor,
        ))
    }
}
