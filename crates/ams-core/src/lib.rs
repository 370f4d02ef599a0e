//! AMS Core
//!
//! AMS のリコンサイル系クレートが共有するドメインモデル。
//! デプロイタスク、スケジューラが毎 tick 使うコホート条件、
//! ベンダー側に作成したリソースのローカル記録を持つ。
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            ams-controlplane                  │
//! │   Scheduler ─▶ TransitionExecutor            │
//! └───────┬──────────────────────┬───────────────┘
//!         │ TaskQuery            │ VendorController
//! ┌───────▼────────┐     ┌───────▼───────────────┐
//! │   TaskStore    │     │ ams-cloud-{huawei,..} │
//! │ (this crate)   │     │  LogStreamStore ◀─────┤
//! └────────────────┘     └───────────────────────┘
//! ```

pub mod error;
pub mod model;
pub mod query;
pub mod state;
pub mod store;

// 再エクスポート
pub use error::{CoreError, Result};
pub use model::{
    ActionKind, AppDetail, ApprovalStatus, ApprovalType, DeployType, LogStreamRecord,
    ProjectDetail, StreamKey, Task, TaskAction, TaskId, TaskStatus, TeamDetail,
};
pub use query::{Cohort, TaskQuery};
pub use state::{StateFile, StateSnapshot};
pub use store::{AppCatalog, LogStreamStore, MemoryStore, TaskStore};
