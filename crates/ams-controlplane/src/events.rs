//! アプリ操作イベント

use crate::error::Result;
use ams_core::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// タスクが最終状態に達したときに発行する操作記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOpEvent {
    pub action_type: String,
    pub task_id: String,
    #[serde(default)]
    pub operator_id: String,
    pub app_id: String,
    pub env: String,
    pub op_time: DateTime<Utc>,
}

impl AppOpEvent {
    pub fn for_task(task: &Task, op_time: DateTime<Utc>) -> Self {
        Self {
            action_type: task.action.to_string(),
            task_id: task.id.to_string(),
            operator_id: task.operator_id.clone(),
            app_id: task.app_id.clone(),
            env: task.env_name.clone(),
            op_time,
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_app_op(&self, event: &AppOpEvent) -> Result<()>;
}
