//! デプロイタスク

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// タスク ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 新しい ID を生成
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// タスクが要求する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    FullDeploy,
    CanaryDeploy,
    FullCanaryDeploy,
    Resume,
    Restart,
    Stop,
    /// レプリカ数 / HPA の変更
    UpdateHpa,
    /// 定期スケーリング (cron HPA) の変更
    UpdateCronHpa,
    ManualLaunch,
    ReloadConfig,
    Delete,
    Clean,
}

/// アクションの大分類 (プロビジョニング内容の選択に使う)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// ワークロード適用前にベンダーリソースが必要
    Deploy,
    /// ワークロード削除前にベンダーリソースを消す
    Teardown,
    /// 既存ワークロードの操作のみ
    Operate,
}

impl TaskAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            TaskAction::FullDeploy
            | TaskAction::CanaryDeploy
            | TaskAction::FullCanaryDeploy
            | TaskAction::Resume => ActionKind::Deploy,
            TaskAction::Delete | TaskAction::Clean => ActionKind::Teardown,
            TaskAction::Restart
            | TaskAction::Stop
            | TaskAction::UpdateHpa
            | TaskAction::UpdateCronHpa
            | TaskAction::ManualLaunch
            | TaskAction::ReloadConfig => ActionKind::Operate,
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskAction::FullDeploy => "full_deploy",
            TaskAction::CanaryDeploy => "canary_deploy",
            TaskAction::FullCanaryDeploy => "full_canary_deploy",
            TaskAction::Resume => "resume",
            TaskAction::Restart => "restart",
            TaskAction::Stop => "stop",
            TaskAction::UpdateHpa => "update_hpa",
            TaskAction::UpdateCronHpa => "update_cron_hpa",
            TaskAction::ManualLaunch => "manual_launch",
            TaskAction::ReloadConfig => "reload_config",
            TaskAction::Delete => "delete",
            TaskAction::Clean => "clean",
        };
        f.write_str(s)
    }
}

/// タスクのライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Init,
    PendingApproval,
    Approved,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Init,
        TaskStatus::PendingApproval,
        TaskStatus::Approved,
        TaskStatus::Running,
        TaskStatus::Success,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub const FINAL: [TaskStatus; 3] =
        [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Cancelled];

    pub fn is_final(&self) -> bool {
        Self::FINAL.contains(self)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Init => write!(f, "init"),
            TaskStatus::PendingApproval => write!(f, "pending_approval"),
            TaskStatus::Approved => write!(f, "approved"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 承認後のリリース方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployType {
    Immediate,
    Scheduled,
}

impl DeployType {
    pub const ALL: [DeployType; 2] = [DeployType::Immediate, DeployType::Scheduled];
}

/// タスクの承認フロー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// 外部の承認フローを通す
    Default,
    /// 作成時点で承認済み
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approving,
    Approved,
    Refused,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 3] = [
        ApprovalStatus::Approving,
        ApprovalStatus::Approved,
        ApprovalStatus::Refused,
    ];
}

/// 1つのアプリ・環境・クラスタに対するデプロイ作業の単位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub app_id: String,
    pub env_name: String,
    pub cluster_name: String,
    /// Kubernetes の namespace (空なら環境名と同じ)
    #[serde(default)]
    pub namespace: String,
    pub action: TaskAction,
    pub approval_type: ApprovalType,
    pub approval_status: ApprovalStatus,
    /// このタスクに紐づく外部承認インスタンス
    #[serde(default)]
    pub approval_instance_id: Option<String>,
    pub deploy_type: DeployType,
    pub status: TaskStatus,
    #[serde(default)]
    pub suspend: bool,
    /// 予約タスクでのみ意味を持つ
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    /// 直近の失敗内容
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub operator_id: String,
    /// デプロイ定義 (コアは中身を解釈しない)
    #[serde(default)]
    pub param: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 承認不要・即時実行の `Init` タスクを作成
    pub fn new(
        id: impl Into<TaskId>,
        app_id: impl Into<String>,
        env_name: impl Into<String>,
        cluster_name: impl Into<String>,
        action: TaskAction,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            app_id: app_id.into(),
            env_name: env_name.into(),
            cluster_name: cluster_name.into(),
            namespace: String::new(),
            action,
            approval_type: ApprovalType::Skip,
            approval_status: ApprovalStatus::Approved,
            approval_instance_id: None,
            deploy_type: DeployType::Immediate,
            status: TaskStatus::Init,
            suspend: false,
            schedule_time: None,
            retry_count: 0,
            detail: String::new(),
            operator_id: String::new(),
            param: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_approval(mut self, approval_type: ApprovalType, status: ApprovalStatus) -> Self {
        self.approval_type = approval_type;
        self.approval_status = status;
        self
    }

    pub fn with_approval_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.approval_instance_id = Some(instance_id.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.deploy_type = DeployType::Scheduled;
        self.schedule_time = Some(at);
        self
    }

    pub fn suspended(mut self, suspend: bool) -> Self {
        self.suspend = suspend;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = operator_id.into();
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// ワークロードの namespace (未指定なら環境名)
    pub fn effective_namespace(&self) -> &str {
        if self.namespace.is_empty() {
            &self.env_name
        } else {
            &self.namespace
        }
    }

    /// 予約タスクの実行時刻がまだ来ていなければ true
    pub fn is_scheduled_in_future(&self, now: DateTime<Utc>) -> bool {
        self.deploy_type == DeployType::Scheduled
            && self.schedule_time.is_some_and(|at| at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_final_statuses() {
        assert!(TaskStatus::Success.is_final());
        assert!(TaskStatus::Failed.is_final());
        assert!(TaskStatus::Cancelled.is_final());
        assert!(!TaskStatus::Init.is_final());
        assert!(!TaskStatus::Running.is_final());
    }

    #[test]
    fn test_action_kind() {
        assert_eq!(TaskAction::FullDeploy.kind(), ActionKind::Deploy);
        assert_eq!(TaskAction::Resume.kind(), ActionKind::Deploy);
        assert_eq!(TaskAction::Delete.kind(), ActionKind::Teardown);
        assert_eq!(TaskAction::Clean.kind(), ActionKind::Teardown);
        assert_eq!(TaskAction::Restart.kind(), ActionKind::Operate);
        assert_eq!(TaskAction::UpdateCronHpa.kind(), ActionKind::Operate);
    }

    #[test]
    fn test_effective_namespace_defaults_to_env() {
        let task = Task::new("t1", "app", "stg", "zeus", TaskAction::FullDeploy);
        assert_eq!(task.effective_namespace(), "stg");

        let task = task.with_namespace("custom");
        assert_eq!(task.effective_namespace(), "custom");
    }

    #[test]
    fn test_scheduled_in_future() {
        let now = Utc::now();
        let task = Task::new("t1", "app", "stg", "zeus", TaskAction::FullDeploy)
            .scheduled_at(now + Duration::seconds(30));
        assert!(task.is_scheduled_in_future(now));
        assert!(!task.is_scheduled_in_future(now + Duration::seconds(31)));

        let immediate = Task::new("t2", "app", "stg", "zeus", TaskAction::FullDeploy);
        assert!(!immediate.is_scheduled_in_future(now));
    }

    #[test]
    fn test_serde_round_trip_uses_snake_case() {
        let task = Task::new("t1", "app", "stg", "zeus", TaskAction::UpdateHpa)
            .with_status(TaskStatus::PendingApproval);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["action"], "update_hpa");
        assert_eq!(json["status"], "pending_approval");
        assert_eq!(json["id"], "t1");

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
