//! 3つのストアトレイトをまとめて実装するインメモリストア

use super::{AppCatalog, LogStreamStore, TaskStore};
use crate::error::{CoreError, Result};
use crate::model::{
    AppDetail, ApprovalStatus, LogStreamRecord, ProjectDetail, StreamKey, Task, TaskId, TaskStatus,
    TeamDetail,
};
use crate::query::TaskQuery;
use crate::state::StateSnapshot;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    streams: BTreeMap<StreamKey, LogStreamRecord>,
    apps: HashMap<String, AppDetail>,
    projects: HashMap<String, ProjectDetail>,
    teams: HashMap<String, TeamDetail>,
}

/// 共有・クローン可能なインメモリストア
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let inner = Inner {
            tasks: snapshot
                .tasks
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            streams: snapshot
                .streams
                .into_iter()
                .map(|s| (s.key.clone(), s))
                .collect(),
            apps: snapshot
                .apps
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            projects: snapshot
                .projects
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            teams: snapshot
                .teams
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        StateSnapshot {
            tasks,
            streams: inner.streams.values().cloned().collect(),
            apps: inner.apps.values().cloned().collect(),
            projects: inner.projects.values().cloned().collect(),
            teams: inner.teams.values().cloned().collect(),
            ..StateSnapshot::default()
        }
    }

    pub async fn put_app(&self, app: AppDetail) {
        self.inner.write().await.apps.insert(app.id.clone(), app);
    }

    pub async fn put_project(&self, project: ProjectDetail) {
        self.inner
            .write()
            .await
            .projects
            .insert(project.id.clone(), project);
    }

    pub async fn put_team(&self, team: TeamDetail) {
        self.inner.write().await.teams.insert(team.id.clone(), team);
    }

    /// 保存済みストリームレコード数
    pub async fn stream_count(&self) -> usize {
        self.inner.read().await.streams.len()
    }

    async fn modify_task<F>(&self, id: &TaskId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Task) + Send,
    {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {}", id)))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        query.validate()?;
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(tasks)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn insert_task(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(CoreError::Persistence(format!(
                "task {} already exists",
                task.id
            )));
        }
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        self.modify_task(id, |task| task.status = status).await
    }

    async fn record_failure(&self, id: &TaskId, detail: &str) -> Result<()> {
        self.modify_task(id, |task| {
            task.retry_count = task.retry_count.saturating_add(1);
            task.detail = detail.to_string();
        })
        .await
    }

    async fn update_approval_status(&self, id: &TaskId, status: ApprovalStatus) -> Result<()> {
        self.modify_task(id, |task| task.approval_status = status)
            .await
    }
}

#[async_trait]
impl LogStreamStore for MemoryStore {
    async fn find_stream(&self, key: &StreamKey) -> Result<Option<LogStreamRecord>> {
        Ok(self.inner.read().await.streams.get(key).cloned())
    }

    async fn save_stream(&self, record: LogStreamRecord) -> Result<()> {
        self.inner
            .write()
            .await
            .streams
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn set_rule_id(&self, key: &StreamKey, rule_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .streams
            .get_mut(key)
            .ok_or_else(|| CoreError::NotFound(format!("log stream record {}", key)))?;
        record.rule_id = Some(rule_id.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_stream(&self, key: &StreamKey) -> Result<()> {
        self.inner.write().await.streams.remove(key);
        Ok(())
    }
}

#[async_trait]
impl AppCatalog for MemoryStore {
    async fn app(&self, app_id: &str) -> Result<AppDetail> {
        self.inner
            .read()
            .await
            .apps
            .get(app_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("app {}", app_id)))
    }

    async fn project(&self, project_id: &str) -> Result<ProjectDetail> {
        self.inner
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("project {}", project_id)))
    }

    async fn team(&self, team_id: &str) -> Result<TeamDetail> {
        self.inner
            .read()
            .await
            .teams
            .get(team_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("team {}", team_id)))
    }
}
