//! タスク検索条件とスケジューラのコホート

use crate::error::{CoreError, Result};
use crate::model::{ApprovalStatus, DeployType, Task, TaskStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// すべての [`crate::TaskStore`] が解釈する検索条件
///
/// 空リストは条件なし。予約時刻の範囲は両端を含み、指定時は予約時刻の
/// 無いタスクを除外する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQuery {
    pub status_list: Vec<TaskStatus>,
    pub status_inverse_list: Vec<TaskStatus>,
    pub suspend: Option<bool>,
    pub deploy_type_list: Vec<DeployType>,
    pub approval_status_list: Vec<ApprovalStatus>,
    pub min_schedule_time: Option<DateTime<Utc>>,
    pub max_schedule_time: Option<DateTime<Utc>>,
    pub approval_instance_id: Option<String>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// 意味のある結果を返せない条件を弾く
    pub fn validate(&self) -> Result<()> {
        if let Some(status) = self
            .status_list
            .iter()
            .find(|s| self.status_inverse_list.contains(s))
        {
            return Err(CoreError::InputValidation(format!(
                "status {} is both required and excluded",
                status
            )));
        }

        if let (Some(min), Some(max)) = (self.min_schedule_time, self.max_schedule_time) {
            if min > max {
                return Err(CoreError::InputValidation(format!(
                    "min_schedule_time {} is after max_schedule_time {}",
                    min, max
                )));
            }
        }

        Ok(())
    }

    /// 1タスクに対して条件を評価
    pub fn matches(&self, task: &Task) -> bool {
        if !self.status_list.is_empty() && !self.status_list.contains(&task.status) {
            return false;
        }
        if self.status_inverse_list.contains(&task.status) {
            return false;
        }
        if self.suspend.is_some_and(|suspend| suspend != task.suspend) {
            return false;
        }
        if !self.deploy_type_list.is_empty() && !self.deploy_type_list.contains(&task.deploy_type)
        {
            return false;
        }
        if !self.approval_status_list.is_empty()
            && !self.approval_status_list.contains(&task.approval_status)
        {
            return false;
        }
        if self.min_schedule_time.is_some() || self.max_schedule_time.is_some() {
            let Some(at) = task.schedule_time else {
                return false;
            };
            if self.min_schedule_time.is_some_and(|min| at < min) {
                return false;
            }
            if self.max_schedule_time.is_some_and(|max| at > max) {
                return false;
            }
        }
        if let Some(instance_id) = &self.approval_instance_id {
            if task.approval_instance_id.as_deref() != Some(instance_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// スケジューラが毎 tick 問い合わせる名前付き条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    /// 開始済みで未完了
    Active,
    /// `Init` で待っている承認済みの即時タスク
    ImmediateDue,
    /// 実行時刻が猶予ウィンドウ内に入った承認済みの予約タスク
    ScheduledDue,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Active, Cohort::ImmediateDue, Cohort::ScheduledDue];

    pub fn name(&self) -> &'static str {
        match self {
            Cohort::Active => "active",
            Cohort::ImmediateDue => "immediate-due",
            Cohort::ScheduledDue => "scheduled-due",
        }
    }

    /// `now` 時点のこのコホートの検索条件を組み立てる
    pub fn query(&self, now: DateTime<Utc>, due_window: Duration) -> TaskQuery {
        match self {
            Cohort::Active => {
                let mut excluded = TaskStatus::FINAL.to_vec();
                excluded.push(TaskStatus::Init);
                TaskQuery {
                    status_inverse_list: excluded,
                    suspend: Some(false),
                    ..TaskQuery::default()
                }
            }
            Cohort::ImmediateDue => TaskQuery {
                status_list: vec![TaskStatus::Init],
                suspend: Some(false),
                deploy_type_list: vec![DeployType::Immediate],
                approval_status_list: vec![ApprovalStatus::Approved],
                ..TaskQuery::default()
            },
            Cohort::ScheduledDue => TaskQuery {
                status_list: vec![TaskStatus::Init],
                suspend: Some(false),
                deploy_type_list: vec![DeployType::Scheduled],
                approval_status_list: vec![ApprovalStatus::Approved],
                min_schedule_time: Some(now - due_window),
                max_schedule_time: Some(now),
                ..TaskQuery::default()
            },
        }
    }
}

impl std::fmt::Display for Cohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
