//! ドメインモデル

mod app;
mod stream;
mod task;

pub use app::{AppDetail, ProjectDetail, TeamDetail};
pub use stream::{LogStreamRecord, StreamKey};
pub use task::{
    ActionKind, ApprovalStatus, ApprovalType, DeployType, Task, TaskAction, TaskId, TaskStatus,
};
