use ams_cloud::CloudError;
use ams_core::{Cohort, CoreError};
use thiserror::Error;

use crate::workload::ApplyError;

/// タスクの選択・遷移中のエラー
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("Store error: {0}")]
    Store(#[from] CoreError),

    #[error("Vendor error: {0}")]
    Cloud(#[from] CloudError),

    #[error("No vendor controller for cluster {cluster} in env {env}")]
    VendorNotConfigured { env: String, cluster: String },

    #[error("Workload apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("Cohort {cohort} query failed: {source}")]
    CohortQuery {
        cohort: Cohort,
        #[source]
        source: CoreError,
    },

    #[error("Cohort {0} query timed out")]
    CohortTimeout(Cohort),

    #[error("Event publish failed: {0}")]
    Publish(String),
}

impl ControlPlaneError {
    /// 再試行せずタスクを Failed にするエラー
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControlPlaneError::Apply(ApplyError::Fatal(_)))
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// メッセージハンドラとパーティション割り当てのエラー
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("{count} approving tasks are bound to approval instance {instance_id}")]
    AmbiguousApproval { instance_id: String, count: usize },

    #[error(transparent)]
    Store(#[from] CoreError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Commit failed: {0}")]
    Commit(String),
}
