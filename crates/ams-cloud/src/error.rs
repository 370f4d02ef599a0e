//! Cloud controller error types

use crate::outcome::RemoteError;
use ams_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{vendor} does not support {operation} yet")]
    Unsupported {
        vendor: String,
        operation: &'static str,
    },

    #[error("Log config is disabled for vendor {0}")]
    LogConfigDisabled(String),

    #[error("Cluster {cluster} is not configured for env {env}")]
    ClusterNotConfigured { env: String, cluster: String },

    #[error("Remote API error: {0}")]
    Remote(RemoteError),

    #[error("Could not recover {resource} {name} from listing")]
    RecoveryFailed {
        resource: &'static str,
        name: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] CoreError),

    #[error("Request signing failed: {0}")]
    Signing(String),
}

impl CloudError {
    pub fn unsupported(vendor: impl std::fmt::Display, operation: &'static str) -> Self {
        CloudError::Unsupported {
            vendor: vendor.to_string(),
            operation,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
