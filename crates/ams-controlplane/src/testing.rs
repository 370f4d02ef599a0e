//! テスト用のインメモリ実装

use crate::error::{ControlPlaneError, Result};
use crate::events::{AppOpEvent, EventPublisher};
use crate::executor::{ExecutorPolicy, TransitionExecutor};
use crate::services::Services;
use crate::vendors::VendorRegistry;
use crate::workload::{ApplyError, WorkloadApplier};
use ams_cloud::{
    CloudError, LogStoreUrls, RecordingAlertSink, RepoTagPage, RepoTagsQuery, VendorController,
    VendorName,
};
use ams_core::{
    AppDetail, ApprovalStatus, MemoryStore, ProjectDetail, Task, TaskAction, TaskId, TaskQuery,
    TaskStatus, TaskStore, TeamDetail,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 呼び出しを記録し、指定時に失敗するベンダーコントローラ
#[derive(Default)]
pub struct FakeVendor {
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<&'static str, VecDeque<CloudError>>>,
    unsupported: Mutex<HashSet<&'static str>>,
    log_config_disabled: AtomicBool,
}

impl FakeVendor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の `op` 呼び出しを `err` で失敗させる
    pub fn fail_once(&self, op: &'static str, err: CloudError) {
        lock(&self.failures).entry(op).or_default().push_back(err);
    }

    pub fn unsupported(&self, op: &'static str) {
        lock(&self.unsupported).insert(op);
    }

    pub fn disable_log_config(&self) {
        self.log_config_disabled.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    fn call(&self, op: &'static str) -> ams_cloud::Result<()> {
        lock(&self.calls).push(op);
        if lock(&self.unsupported).contains(op) {
            return Err(CloudError::unsupported(VendorName::Huawei, op));
        }
        if self.log_config_disabled.load(Ordering::SeqCst)
            && matches!(op, "apply_log_config" | "delete_log_config")
        {
            return Err(CloudError::LogConfigDisabled(VendorName::Huawei.to_string()));
        }
        match lock(&self.failures).get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VendorController for FakeVendor {
    fn name(&self) -> VendorName {
        VendorName::Huawei
    }

    fn region(&self) -> &str {
        "test-region"
    }

    async fn apply_log_config(
        &self,
        _project: &ProjectDetail,
        _app: &AppDetail,
        _task: &Task,
        _team: &TeamDetail,
    ) -> ams_cloud::Result<()> {
        self.call("apply_log_config")
    }

    async fn delete_log_config(&self, _: &str, _: &str, _: &str) -> ams_cloud::Result<()> {
        self.call("delete_log_config")
    }

    async fn ensure_log_index(&self, _: &str, _: &str, _: &AppDetail) -> ams_cloud::Result<()> {
        self.call("ensure_log_index")
    }

    async fn apply_log_dump(&self, _: &str, _: &str, _: &str) -> ams_cloud::Result<()> {
        self.call("apply_log_dump")
    }

    async fn delete_log_dump(&self, _: &str, _: &str, _: &str) -> ams_cloud::Result<()> {
        self.call("delete_log_dump")
    }

    async fn get_log_store_url(
        &self,
        _: &str,
        _: &ProjectDetail,
        _: &AppDetail,
        _: &str,
    ) -> ams_cloud::Result<LogStoreUrls> {
        Ok(LogStoreUrls::default())
    }

    async fn get_repo_tags(&self, _: &RepoTagsQuery) -> ams_cloud::Result<RepoTagPage> {
        Ok(RepoTagPage::default())
    }
}

/// 結果を指定でき、同時実行数を計測するワークロード適用
#[derive(Default)]
pub struct FakeApplier {
    results: Mutex<VecDeque<std::result::Result<(), ApplyError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の適用結果を積む (未指定なら成功)
    pub fn push_result(&self, result: std::result::Result<(), ApplyError>) {
        lock(&self.results).push_back(result);
    }

    /// すべての適用に `delay` かける
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 観測した最大同時適用数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadApplier for FakeApplier {
    async fn apply(&self, _task: &Task) -> std::result::Result<(), ApplyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        lock(&self.results).pop_front().unwrap_or(Ok(()))
    }
}

/// 発行イベントを保持する (失敗モードに切り替え可)
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<AppOpEvent>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AppOpEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_app_op(&self, event: &AppOpEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::Publish("broker unavailable".to_string()));
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

/// 検索を遅延・失敗させられるタスクストア
#[derive(Default)]
pub struct FlakyTaskStore {
    inner: MemoryStore,
    fail_queries: AtomicBool,
    query_delay: Mutex<Option<Duration>>,
    queries: AtomicUsize,
}

impl FlakyTaskStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *lock(&self.query_delay) = Some(delay);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn query_tasks(&self, query: &TaskQuery) -> ams_core::Result<Vec<Task>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.query_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ams_core::CoreError::Persistence(
                "task store unavailable".to_string(),
            ));
        }
        self.inner.query_tasks(query).await
    }

    async fn get_task(&self, id: &TaskId) -> ams_core::Result<Option<Task>> {
        self.inner.get_task(id).await
    }

    async fn insert_task(&self, task: Task) -> ams_core::Result<()> {
        self.inner.insert_task(task).await
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> ams_core::Result<()> {
        self.inner.update_status(id, status).await
    }

    async fn record_failure(&self, id: &TaskId, detail: &str) -> ams_core::Result<()> {
        self.inner.record_failure(id, detail).await
    }

    async fn update_approval_status(
        &self,
        id: &TaskId,
        status: ApprovalStatus,
    ) -> ams_core::Result<()> {
        self.inner.update_approval_status(id, status).await
    }
}

/// フェイクでつないだ Services
///
/// アプリ `app-1` を環境 `stg` のクラスタ `zeus` でフェイクベンダーが担当する。
pub struct Fixture {
    pub store: MemoryStore,
    pub tasks: Arc<FlakyTaskStore>,
    pub vendor: Arc<FakeVendor>,
    pub applier: Arc<FakeApplier>,
    pub publisher: Arc<RecordingPublisher>,
    pub alerts: Arc<RecordingAlertSink>,
    pub services: Services,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        store
            .put_team(TeamDetail {
                id: "team-1".to_string(),
                name: "sre".to_string(),
            })
            .await;
        store
            .put_project(ProjectDetail {
                id: "proj-1".to_string(),
                name: "shop".to_string(),
                team_id: "team-1".to_string(),
                log_store_name: String::new(),
            })
            .await;
        store
            .put_app(AppDetail {
                id: "app-1".to_string(),
                name: "cart".to_string(),
                project_id: "proj-1".to_string(),
                log_ttl_in_days: Some(7),
                log_store_names: HashMap::new(),
            })
            .await;

        let tasks = Arc::new(FlakyTaskStore::new(store.clone()));
        let vendor = Arc::new(FakeVendor::new());
        let applier = Arc::new(FakeApplier::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let alerts = Arc::new(RecordingAlertSink::new());

        let vendors = VendorRegistry::new().with("stg", "zeus", vendor.clone());
        let services = Services::new(
            tasks.clone(),
            Arc::new(store.clone()),
            vendors,
            applier.clone(),
            publisher.clone(),
            alerts.clone(),
        );

        Self {
            store,
            tasks,
            vendor,
            applier,
            publisher,
            alerts,
            services,
        }
    }

    pub fn executor(&self) -> TransitionExecutor {
        TransitionExecutor::new(self.services.clone(), ExecutorPolicy::default())
    }

    /// `stg/zeus` への `app-1` の承認済み即時フルデプロイ
    pub fn deploy_task(id: &str) -> Task {
        Task::new(id, "app-1", "stg", "zeus", TaskAction::FullDeploy)
    }

    pub async fn insert(&self, task: Task) {
        if let Err(err) = self.store.insert_task(task).await {
            panic!("insert task: {}", err);
        }
    }

    pub async fn task(&self, id: &str) -> Task {
        match self.store.get_task(&TaskId::new(id)).await {
            Ok(Some(task)) => task,
            other => panic!("task {} not readable: {:?}", id, other.map(|_| ())),
        }
    }
}
