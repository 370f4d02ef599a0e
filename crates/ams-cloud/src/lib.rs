//! AMS Cloud
//!
//! Vendor-neutral capability set used by the transition executor to provision
//! and remove the infrastructure that backs a workload (log streams, mapping
//! rules, log indexes and dumps) and to read registry metadata.
//!
//! Every vendor crate implements [`VendorController`]. Remote API failures are
//! normalized into a [`RemoteError`] and classified into a [`RemoteOutcome`]
//! through a declarative [`OutcomeClassifier`] table.

pub mod alert;
pub mod cluster;
pub mod controller;
pub mod error;
pub mod outcome;

// Re-exports
pub use alert::{Alert, AlertSink, RecordingAlertSink, TracingAlertSink};
pub use cluster::{ClusterConfig, ClusterMap};
pub use controller::{LogStoreUrls, RepoTag, RepoTagPage, RepoTagsQuery, VendorController, VendorName};
pub use error::{CloudError, Result};
pub use outcome::{OutcomeClassifier, OutcomeKind, RemoteError, RemoteOutcome};
