//! アプリ操作・承認コールバックトピックのハンドラ

use crate::consumer::{Message, MessageHandler};
use crate::error::ConsumerError;
use crate::events::AppOpEvent;
use crate::executor::TransitionExecutor;
use ams_core::{ApprovalStatus, TaskId, TaskQuery};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// 参照先タスクをエグゼキュータに通す (最終状態なら操作記録として残すだけ)
pub struct AppOpHandler {
    executor: Arc<TransitionExecutor>,
}

impl AppOpHandler {
    pub fn new(executor: Arc<TransitionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl MessageHandler for AppOpHandler {
    fn name(&self) -> &'static str {
        "app-op"
    }

    async fn handle(&self, message: &Message) -> Result<(), ConsumerError> {
        let event: AppOpEvent = serde_json::from_slice(&message.value)?;
        let task = self
            .executor
            .services()
            .tasks
            .get_task(&TaskId::new(event.task_id.as_str()))
            .await?
            .ok_or_else(|| ConsumerError::TaskNotFound(event.task_id.clone()))?;

        if task.is_final() {
            info!(
                task_id = %task.id,
                app_id = %event.app_id,
                env = %event.env,
                action_type = %event.action_type,
                operator_id = %event.operator_id,
                op_time = %event.op_time,
                status = %task.status,
                "App operation recorded"
            );
            return Ok(());
        }
        if task.suspend {
            debug!(task_id = %task.id, "Task is suspended, ignoring operation event");
            return Ok(());
        }

        let outcome = self.executor.execute(task).await;
        debug!(task_id = %event.task_id, ?outcome, "Operation event executed");
        Ok(())
    }
}

/// 承認プロセスのコールバック
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalCallback {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: Option<ApprovalCallbackData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalCallbackData {
    #[serde(rename = "processInstanceId")]
    pub process_instance_id: String,
    #[serde(rename = "EventType", default)]
    pub event_type: String,
    /// 承認のフェーズ (start / finish / cancel)
    #[serde(rename = "type", default)]
    pub phase: String,
    #[serde(default)]
    pub result: String,
}

const INSTANCE_CHANGE_EVENT: &str = "bpms_instance_change";
const FINISH_PHASE: &str = "finish";
const REFUSE_RESULT: &str = "refuse";

impl ApprovalCallbackData {
    /// 承認を確定させるのは完了したインスタンス変更だけ
    pub fn is_finished_instance_change(&self) -> bool {
        self.event_type == INSTANCE_CHANGE_EVENT && self.phase == FINISH_PHASE
    }

    pub fn approval_status(&self) -> ApprovalStatus {
        if self.result == REFUSE_RESULT {
            ApprovalStatus::Refused
        } else {
            ApprovalStatus::Approved
        }
    }
}

/// 完了した承認に紐づくタスクの承認状態を確定する
pub struct ApprovalHandler {
    executor: Arc<TransitionExecutor>,
}

impl ApprovalHandler {
    pub fn new(executor: Arc<TransitionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl MessageHandler for ApprovalHandler {
    fn name(&self) -> &'static str {
        "approval"
    }

    async fn handle(&self, message: &Message) -> Result<(), ConsumerError> {
        let callback: ApprovalCallback = serde_json::from_slice(&message.value)?;
        let Some(data) = callback.data else {
            debug!(kind = %callback.kind, "Approval callback without data, ignoring");
            return Ok(());
        };
        if !data.is_finished_instance_change() {
            debug!(
                event_type = %data.event_type,
                phase = %data.phase,
                "Approval callback is not a finished instance change, ignoring"
            );
            return Ok(());
        }

        let tasks = &self.executor.services().tasks;
        let query = TaskQuery {
            approval_instance_id: Some(data.process_instance_id.clone()),
            approval_status_list: vec![ApprovalStatus::Approving],
            ..TaskQuery::default()
        };
        let approving = tasks.query_tasks(&query).await?;
        let task = match approving.as_slice() {
            [] => {
                debug!(
                    instance_id = %data.process_instance_id,
                    "No approving task bound to approval instance, ignoring"
                );
                return Ok(());
            }
            [task] => task,
            _ => {
                return Err(ConsumerError::AmbiguousApproval {
                    instance_id: data.process_instance_id,
                    count: approving.len(),
                });
            }
        };

        let status = data.approval_status();
        tasks.update_approval_status(&task.id, status).await?;
        info!(
            task_id = %task.id,
            instance_id = %data.process_instance_id,
            approval_status = ?status,
            "Approval settled"
        );
        Ok(())
    }
}
