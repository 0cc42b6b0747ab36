//! Mock release backend for unit testing
//!
//! Provides an in-process implementation of [`ReleaseBackend`] so orchestration
//! logic can be exercised without a real backend binary. The mock binds an
//! actual listener on the probe port, so readiness behaves like the real thing.

use crate::error::HelmError;
use crate::session::{BackendConfig, BackendSession, ReleaseBackend};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Mock backend recording every start request.
///
/// Can be configured to fail the spawn, for exercising the
/// abort-before-install path.
#[derive(Debug, Clone, Default)]
pub struct MockReleaseBackend {
    started: Arc<Mutex<Vec<BackendConfig>>>,
    fail_spawn: bool,
}

impl MockReleaseBackend {
    /// Creates a mock whose sessions start and become ready immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose every start fails like a missing binary.
    pub fn failing() -> Self {
        Self {
            started: Arc::new(Mutex::new(Vec::new())),
            fail_spawn: true,
        }
    }

    /// Configs of every session started so far.
    pub fn started_configs(&self) -> Vec<BackendConfig> {
        self.started.lock().map(|configs| configs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReleaseBackend for MockReleaseBackend {
    async fn start(&self, config: BackendConfig) -> Result<BackendSession, HelmError> {
        if self.fail_spawn {
            return Err(HelmError::BackendSpawn {
                binary: "mock-backend".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        if let Ok(mut started) = self.started.lock() {
            started.push(config.clone());
        }

        // A real listener on the probe port makes wait_ready pass
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.probe_port))
            .await
            .map_err(|source| HelmError::BackendSpawn {
                binary: "mock-backend".to_string(),
                source,
            })?;

        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let supervisor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => return Ok(()),
                    _ = listener.accept() => {}
                }
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
