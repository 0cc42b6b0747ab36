//! Per-target Helm release sessions
//!
//! Plumbing for driving one chart installation against one target cluster:
//! ephemeral port allocation, transient credential bundles, a supervised
//! release backend process with kill-on-cancel semantics, and the install
//! driver that executes against it.
//!
//! # Example
//!
//! ```no_run
//! use helm_runner::{
//!     BackendConfig, ChartSource, ClusterCredentials, HelmCli, PortAllocator,
//!     ReleaseBackend, TillerBackend, write_kubeconfig,
//! };
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), helm_runner::HelmError> {
//! let mut ports = PortAllocator::new();
//! let credentials = ClusterCredentials {
//!     server: "https://cluster-a:6443".to_string(),
//!     ..Default::default()
//! };
//! let bundle = write_kubeconfig(&credentials, "apps")?;
//!
//! let backend = TillerBackend::default();
//! let session = backend
//!     .start(BackendConfig {
//!         listen_port: ports.allocate()?,
//!         probe_port: ports.allocate()?,
//!         release_namespace: Some("apps".to_string()),
//!         kubeconfig_path: bundle.path().to_path_buf(),
//!     })
//!     .await?;
//! session.wait_ready(Duration::from_secs(30)).await?;
//!
//! let chart = ChartSource {
//!     repository_url: "https://charts.example.com".to_string(),
//!     chart_reference: "app".to_string(),
//!     version: None,
//!     release_name: None,
//! };
//! let answers = BTreeMap::from([("replicas".to_string(), "3".to_string())]);
//! let outcome = HelmCli::default()
//!     .install(&chart, &answers, session.service_port())
//!     .await;
//! session.stop().await?;
//! outcome
//! # }
//! ```

pub mod error;
pub mod install;
pub mod kubeconfig;
pub mod ports;
pub mod session;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::HelmError;
pub use install::{ChartSource, HelmCli, flatten_answers};
pub use kubeconfig::{ClusterCredentials, CredentialBundle, Kubeconfig, write_kubeconfig};
pub use ports::PortAllocator;
pub use session::{BackendConfig, BackendSession, ReleaseBackend, TillerBackend};
#[cfg(feature = "test-util")]
pub use mock::MockReleaseBackend;
