//! CRD YAML generator
//!
//! Prints the MultiClusterApp CRD manifest to stdout for installation:
//! `cargo run --bin crdgen > deploy/crds.yaml`

use crds::MultiClusterApp;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&MultiClusterApp::crd())?);
    Ok(())
}
