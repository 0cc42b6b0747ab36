//! FleetApps CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the FleetApps controllers.

pub mod multi_cluster_app;

pub use multi_cluster_app::*;
