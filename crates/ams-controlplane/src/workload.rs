//! クラスタへのワークロード適用

use ams_core::Task;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// 後の tick で再試行する価値がある
    #[error("{0}")]
    Retryable(String),

    /// このタスクは成功しえない
    #[error("{0}")]
    Fatal(String),
}

/// タスクのワークロードを Kubernetes クラスタへ適用する
///
/// マニフェストの生成と適用はコアの外で行う。実装は結果だけを返す。
#[async_trait]
pub trait WorkloadApplier: Send + Sync {
    async fn apply(&self, task: &Task) -> std::result::Result<(), ApplyError>;
}

/// 適用内容をログに出して成功を返す
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunApplier;

#[async_trait]
impl WorkloadApplier for DryRunApplier {
    async fn apply(&self, task: &Task) -> std::result::Result<(), ApplyError> {
        tracing::info!(
            task_id = %task.id,
            app_id = %task.app_id,
            action = %task.action,
            cluster = %task.cluster_name,
            namespace = %task.effective_namespace(),
            "dry-run: workload apply skipped"
        );
        Ok(())
    }
}
