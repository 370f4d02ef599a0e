//! ストアのトレイト
//!
//! 実体のドキュメント DB は CRUD 層の持ち物。コアは以下の操作にだけ依存する。

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{
    AppDetail, ApprovalStatus, LogStreamRecord, ProjectDetail, StreamKey, Task, TaskId, TaskStatus,
    TeamDetail,
};
use crate::query::TaskQuery;
use async_trait::async_trait;

/// スケジューラ・エグゼキュータ・コンシューマが使うタスクの永続化
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// `query` に一致するタスク (作成順)
    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>>;

    async fn insert_task(&self, task: Task) -> Result<()>;

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<()>;

    /// リトライ回数を1増やし、失敗内容を置き換える
    async fn record_failure(&self, id: &TaskId, detail: &str) -> Result<()>;

    async fn update_approval_status(&self, id: &TaskId, status: ApprovalStatus) -> Result<()>;
}

/// ベンダー側ログストリーム ID のローカル記録
#[async_trait]
pub trait LogStreamStore: Send + Sync {
    async fn find_stream(&self, key: &StreamKey) -> Result<Option<LogStreamRecord>>;

    /// `record.key` のレコードを追加または置換
    async fn save_stream(&self, record: LogStreamRecord) -> Result<()>;

    async fn set_rule_id(&self, key: &StreamKey, rule_id: &str) -> Result<()>;

    /// レコードを削除 (存在しなくてもエラーにしない)
    async fn delete_stream(&self, key: &StreamKey) -> Result<()>;
}

/// プロジェクト・アプリ・チーム情報の参照
#[async_trait]
pub trait AppCatalog: Send + Sync {
    async fn app(&self, app_id: &str) -> Result<AppDetail>;

    async fn project(&self, project_id: &str) -> Result<ProjectDetail>;

    async fn team(&self, team_id: &str) -> Result<TeamDetail>;
}
