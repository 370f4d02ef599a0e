//! 1タスクにつき1回の状態遷移

use crate::error::{ControlPlaneError, Result};
use crate::events::AppOpEvent;
use crate::retry::RetryStrategy;
use crate::services::Services;
use ams_cloud::{Alert, CloudError};
use ams_config::SchedulerConfig;
use ams_core::{ActionKind, ApprovalStatus, Task, TaskStatus};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// タスクを処理する前に適用する制限
#[derive(Debug, Clone)]
pub struct ExecutorPolicy {
    /// 失敗回数がこれを超えたタスクは Failed にする
    pub max_retry_count: u32,
    /// 処理中の状態 (Running、または実行時刻の来た Approved) に留まれる最長時間
    pub stage_timeout: chrono::Duration,
    pub retry: RetryStrategy,
}

impl Default for ExecutorPolicy {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ExecutorPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_retry_count: config.max_retry_count,
            stage_timeout: chrono::Duration::seconds(
                i64::try_from(config.stage_timeout_secs).unwrap_or(i64::MAX / 1000),
            ),
            retry: RetryStrategy::from(&config.retry_strategy),
        }
    }
}

/// 1ユニットの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 別のユニットが処理中
    Locked,
    /// 最終状態・停止中・選択後に変化済みなど、何もしない
    Skipped,
    /// 承認・予約時刻・リトライ待ち
    Waiting,
    Advanced { from: TaskStatus, to: TaskStatus },
    /// 副作用が失敗し、次の試行に向けて記録した
    Retrying(String),
    /// 期限を超えたため破棄した
    TimedOut,
}

/// タスクをライフサイクル上で1段進める
///
/// ```text
/// Init/Approved ──provision──▶ Running ──apply──▶ Success
///                                  └──fatal apply──▶ Failed
/// PendingApproval ──approved──▶ Approved
///                 └─refused───▶ Cancelled
/// ```
///
/// 失敗は [`TransitionExecutor::execute`] の外に出さず、リトライ回数の加算と
/// 失敗内容としてタスクに記録する。
pub struct TransitionExecutor {
    services: Services,
    policy: ExecutorPolicy,
}

impl TransitionExecutor {
    pub fn new(services: Services, policy: ExecutorPolicy) -> Self {
        Self { services, policy }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn policy(&self) -> &ExecutorPolicy {
        &self.policy
    }

    pub async fn execute(&self, task: Task) -> TransitionOutcome {
        let Some(_lock) = self.services.locks.try_acquire(&task.id) else {
            debug!(task_id = %task.id, "Task is locked by another unit, skipping");
            return TransitionOutcome::Locked;
        };

        let task = match self.reload(task).await {
            Some(task) => task,
            None => return TransitionOutcome::Skipped,
        };

        match self.transition(&task).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(&task, err).await,
        }
    }

    /// ストアにある最新の `snapshot`
    ///
    /// スナップショット取得後に別のユニットが進めていれば `None`。
    async fn reload(&self, snapshot: Task) -> Option<Task> {
        let current = match self.services.tasks.get_task(&snapshot.id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                warn!(task_id = %snapshot.id, "Task no longer exists, skipping");
                return None;
            }
            Err(err) => {
                error!(task_id = %snapshot.id, error = %err, "Failed to reload task, skipping");
                return None;
            }
        };
        if current.status != snapshot.status || current.updated_at != snapshot.updated_at {
            debug!(
                task_id = %current.id,
                snapshot_status = %snapshot.status,
                status = %current.status,
                "Task changed since it was selected, skipping"
            );
            return None;
        }
        Some(current)
    }

    /// 人の承認か時刻を待っているだけの状態
    fn is_waiting(task: &Task, now: DateTime<Utc>) -> bool {
        match task.status {
            TaskStatus::Init => true,
            TaskStatus::PendingApproval => task.approval_status == ApprovalStatus::Approving,
            TaskStatus::Approved => task.is_scheduled_in_future(now),
            _ => false,
        }
    }

    async fn transition(&self, task: &Task) -> Result<TransitionOutcome> {
        if task.is_final() || task.suspend {
            return Ok(TransitionOutcome::Skipped);
        }

        let now = Utc::now();
        if task.retry_count > self.policy.max_retry_count {
            warn!(
                task_id = %task.id,
                retry_count = task.retry_count,
                "Retry limit exceeded, failing task"
            );
            return self.finish(task, TaskStatus::Failed).await;
        }
        if !Self::is_waiting(task, now) && now - task.updated_at > self.policy.stage_timeout {
            warn!(
                task_id = %task.id,
                status = %task.status,
                updated_at = %task.updated_at,
                "Stage timed out, failing task"
            );
            return self.finish(task, TaskStatus::Failed).await;
        }
        if !self.policy.retry.is_due(task, now) {
            return Ok(TransitionOutcome::Waiting);
        }

        match task.status {
            TaskStatus::PendingApproval => match task.approval_status {
                ApprovalStatus::Approved => self.advance(task, TaskStatus::Approved).await,
                ApprovalStatus::Refused => self.finish(task, TaskStatus::Cancelled).await,
                ApprovalStatus::Approving => Ok(TransitionOutcome::Waiting),
            },
            TaskStatus::Init | TaskStatus::Approved => {
                if task.approval_status != ApprovalStatus::Approved
                    || task.is_scheduled_in_future(now)
                {
                    return Ok(TransitionOutcome::Waiting);
                }
                self.provision(task).await?;
                self.advance(task, TaskStatus::Running).await
            }
            TaskStatus::Running => {
                self.services.applier.apply(task).await?;
                self.finish(task, TaskStatus::Success).await
            }
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled => {
                Ok(TransitionOutcome::Skipped)
            }
        }
    }

    /// アクションが必要とするベンダー側リソースの準備
    async fn provision(&self, task: &Task) -> Result<()> {
        let (env, cluster) = (task.env_name.as_str(), task.cluster_name.as_str());
        match task.action.kind() {
            ActionKind::Operate => Ok(()),
            ActionKind::Deploy => {
                let vendor = self.services.vendors.controller(env, cluster)?;
                let catalog = &self.services.catalog;
                let app = catalog.app(&task.app_id).await?;
                let project = catalog.project(&app.project_id).await?;
                let team = catalog.team(&project.team_id).await?;

                match vendor.apply_log_config(&project, &app, task, &team).await {
                    Err(CloudError::LogConfigDisabled(name)) => {
                        debug!(task_id = %task.id, vendor = %name, "Log config disabled, skipping logging phase");
                        return Ok(());
                    }
                    result => skip_unsupported(result)?,
                }
                skip_unsupported(vendor.ensure_log_index(cluster, env, &app).await)?;
                skip_unsupported(vendor.apply_log_dump(cluster, env, &task.app_id).await)?;
                Ok(())
            }
            ActionKind::Teardown => {
                let vendor = self.services.vendors.controller(env, cluster)?;
                skip_unsupported(vendor.delete_log_dump(cluster, env, &task.app_id).await)?;
                match vendor.delete_log_config(cluster, env, &task.app_id).await {
                    Err(CloudError::LogConfigDisabled(_)) => Ok(()),
                    result => skip_unsupported(result),
                }
            }
        }
    }

    async fn advance(&self, task: &Task, next: TaskStatus) -> Result<TransitionOutcome> {
        self.services.tasks.update_status(&task.id, next).await?;
        info!(task_id = %task.id, from = %task.status, to = %next, "Task transitioned");
        Ok(TransitionOutcome::Advanced {
            from: task.status,
            to: next,
        })
    }

    async fn finish(&self, task: &Task, status: TaskStatus) -> Result<TransitionOutcome> {
        let outcome = self.advance(task, status).await?;
        self.publish_final(task).await;
        Ok(outcome)
    }

    async fn publish_final(&self, task: &Task) {
        let event = AppOpEvent::for_task(task, Utc::now());
        if let Err(err) = self.services.events.publish_app_op(&event).await {
            error!(task_id = %task.id, error = %err, "Failed to publish app operation event");
            self.services.alerts.capture(
                Alert::new("publishAppOpEvent", &err).with("task_id", task.id.to_string()),
            );
        }
    }

    async fn fail(&self, task: &Task, err: ControlPlaneError) -> TransitionOutcome {
        let detail = err.to_string();
        error!(
            task_id = %task.id,
            status = %task.status,
            retry_count = task.retry_count,
            error = %detail,
            "Transition failed"
        );

        if let Err(store_err) = self.services.tasks.record_failure(&task.id, &detail).await {
            error!(task_id = %task.id, error = %store_err, "Failed to record task failure");
        }

        if err.is_fatal() {
            match self.finish(task, TaskStatus::Failed).await {
                Ok(outcome) => return outcome,
                Err(store_err) => {
                    error!(task_id = %task.id, error = %store_err, "Failed to mark task failed");
                }
            }
        }
        TransitionOutcome::Retrying(detail)
    }
}

/// ベンダーが実装していないフェーズは飛ばす
fn skip_unsupported(result: ams_cloud::Result<()>) -> Result<()> {
    match result {
        Err(CloudError::Unsupported { vendor, operation }) => {
            debug!(%vendor, operation, "Not supported by vendor, skipping phase");
            Ok(())
        }
        other => other.map_err(ControlPlaneError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::workload::ApplyError;
    use ams_core::{ApprovalType, TaskAction, TaskId, TaskStore};

    async fn run(fixture: &Fixture, id: &str) -> (TransitionOutcome, Task) {
        let task = fixture.task(id).await;
        let outcome = fixture.executor().execute(task).await;
        (outcome, fixture.task(id).await)
    }

    #[tokio::test]
    async fn test_deploy_provisions_then_runs() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;

        let (outcome, task) = run(&fixture, "t1").await;
        assert_eq!(
            outcome,
            TransitionOutcome::Advanced {
                from: TaskStatus::Init,
                to: TaskStatus::Running
            }
        );
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(
            fixture.vendor.calls(),
            vec!["apply_log_config", "ensure_log_index", "apply_log_dump"]
        );

        let (outcome, task) = run(&fixture, "t1").await;
        assert_eq!(
            outcome,
            TransitionOutcome::Advanced {
                from: TaskStatus::Running,
                to: TaskStatus::Success
            }
        );
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(fixture.applier.calls(), 1);

        let events = fixture.publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, "t1");
        assert_eq!(events[0].action_type, "full_deploy");
    }

    #[tokio::test]
    async fn test_teardown_deletes_dump_then_config() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Task::new("t1", "app-1", "stg", "zeus", TaskAction::Clean))
            .await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(
            fixture.vendor.calls(),
            vec!["delete_log_dump", "delete_log_config"]
        );
    }

    #[tokio::test]
    async fn test_operate_action_skips_vendor() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Task::new("t1", "app-1", "stg", "unknown-cluster", TaskAction::Restart))
            .await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert!(fixture.vendor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provisioning_failure_records_retry() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;
        fixture
            .vendor
            .fail_once("apply_log_config", CloudError::Transport("connection reset".into()));

        let (outcome, task) = run(&fixture, "t1").await;
        assert!(matches!(outcome, TransitionOutcome::Retrying(_)));
        assert_eq!(task.status, TaskStatus::Init);
        assert_eq!(task.retry_count, 1);
        assert!(task.detail.contains("connection reset"));
        assert!(!task.suspend);

        // 次の試行は通る
        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_log_config_disabled_skips_logging_phase() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;
        fixture.vendor.disable_log_config();

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.retry_count, 0);
        assert_eq!(fixture.vendor.calls(), vec!["apply_log_config"]);
    }

    #[tokio::test]
    async fn test_unsupported_phases_are_skipped() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;
        fixture.vendor.unsupported("ensure_log_index");
        fixture.vendor.unsupported("apply_log_dump");

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.retry_count, 0);
    }

    #[tokio::test]
    async fn test_missing_vendor_is_a_failure() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Task::new("t1", "app-1", "prd", "zeus", TaskAction::FullDeploy))
            .await;

        let (outcome, task) = run(&fixture, "t1").await;
        assert!(matches!(outcome, TransitionOutcome::Retrying(_)));
        assert_eq!(task.retry_count, 1);
        assert!(task.detail.contains("No vendor controller"));
    }

    #[tokio::test]
    async fn test_fatal_apply_fails_task() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Fixture::deploy_task("t1").with_status(TaskStatus::Running))
            .await;
        fixture
            .applier
            .push_result(Err(ApplyError::Fatal("image not found".into())));

        let (outcome, task) = run(&fixture, "t1").await;
        assert_eq!(
            outcome,
            TransitionOutcome::Advanced {
                from: TaskStatus::Running,
                to: TaskStatus::Failed
            }
        );
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.detail, "Workload apply failed: image not found");
        assert_eq!(fixture.publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_retryable_apply_keeps_running() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Fixture::deploy_task("t1").with_status(TaskStatus::Running))
            .await;
        fixture
            .applier
            .push_result(Err(ApplyError::Retryable("api server busy".into())));

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.retry_count, 1);
        assert!(fixture.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_retry_limit_fails_task() {
        let fixture = Fixture::new().await;
        let mut task = Fixture::deploy_task("t1");
        task.retry_count = 11;
        fixture.insert(task).await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(fixture.vendor.calls().is_empty());
        assert_eq!(fixture.publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_stage_timeout_fails_started_task() {
        let fixture = Fixture::new().await;
        fixture
            .insert(
                Fixture::deploy_task("t1")
                    .with_status(TaskStatus::Running)
                    .with_updated_at(Utc::now() - chrono::Duration::minutes(11)),
            )
            .await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(fixture.applier.calls(), 0);
    }

    #[tokio::test]
    async fn test_stage_timeout_ignores_init() {
        let fixture = Fixture::new().await;
        fixture
            .insert(
                Fixture::deploy_task("t1")
                    .with_updated_at(Utc::now() - chrono::Duration::minutes(30)),
            )
            .await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_pending_approval_follows_approval_status() {
        let fixture = Fixture::new().await;
        let pending = |id: &str, status| {
            Fixture::deploy_task(id)
                .with_status(TaskStatus::PendingApproval)
                .with_approval(ApprovalType::Default, status)
        };
        fixture.insert(pending("a", ApprovalStatus::Approved)).await;
        fixture.insert(pending("r", ApprovalStatus::Refused)).await;
        fixture.insert(pending("w", ApprovalStatus::Approving)).await;

        assert_eq!(run(&fixture, "a").await.1.status, TaskStatus::Approved);
        assert_eq!(run(&fixture, "r").await.1.status, TaskStatus::Cancelled);
        let (outcome, task) = run(&fixture, "w").await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
        assert_eq!(task.status, TaskStatus::PendingApproval);

        // 最終状態に達したのはキャンセルされたタスクだけ
        assert_eq!(fixture.publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_future_schedule_waits() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Fixture::deploy_task("t1").scheduled_at(Utc::now() + chrono::Duration::hours(1)))
            .await;

        let (outcome, task) = run(&fixture, "t1").await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
        assert_eq!(task.status, TaskStatus::Init);
    }

    #[tokio::test]
    async fn test_unapproved_init_task_waits() {
        let fixture = Fixture::new().await;
        fixture
            .insert(
                Fixture::deploy_task("t1")
                    .with_approval(ApprovalType::Default, ApprovalStatus::Approving),
            )
            .await;

        let (outcome, _) = run(&fixture, "t1").await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
        assert!(fixture.vendor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_locked_task_is_skipped() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;
        let _held = fixture.services.locks.try_acquire(&TaskId::new("t1")).unwrap();

        let (outcome, task) = run(&fixture, "t1").await;
        assert_eq!(outcome, TransitionOutcome::Locked);
        assert_eq!(task.status, TaskStatus::Init);
    }

    #[tokio::test]
    async fn test_backoff_delays_retry() {
        let fixture = Fixture::new().await;
        let mut task = Fixture::deploy_task("t1");
        task.retry_count = 3;
        fixture.insert(task).await;

        let executor = TransitionExecutor::new(
            fixture.services.clone(),
            ExecutorPolicy {
                retry: RetryStrategy::ExponentialBackoff {
                    base: std::time::Duration::from_secs(60),
                    max: std::time::Duration::from_secs(300),
                    jitter: false,
                },
                ..ExecutorPolicy::default()
            },
        );
        let outcome = executor.execute(fixture.task("t1").await).await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
    }

    #[tokio::test]
    async fn test_publish_failure_is_alerted_not_reverted() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Fixture::deploy_task("t1").with_status(TaskStatus::Running))
            .await;
        fixture.publisher.fail(true);

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Success);
        let alerts = fixture.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, "publishAppOpEvent");
        assert_eq!(alerts[0].data["task_id"], "t1");
    }

    #[tokio::test]
    async fn test_final_task_is_skipped() {
        let fixture = Fixture::new().await;
        fixture
            .insert(Fixture::deploy_task("t1").with_status(TaskStatus::Success))
            .await;
        let (outcome, _) = run(&fixture, "t1").await;
        assert_eq!(outcome, TransitionOutcome::Skipped);
        assert!(fixture.store.get_task(&TaskId::new("t1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_snapshot_of_finished_task_is_skipped() {
        let fixture = Fixture::new().await;
        fixture.insert(Fixture::deploy_task("t1")).await;
        let stale = fixture.task("t1").await;

        run(&fixture, "t1").await;
        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Success);

        let outcome = fixture.executor().execute(stale).await;
        assert_eq!(outcome, TransitionOutcome::Skipped);
        assert_eq!(fixture.task("t1").await.status, TaskStatus::Success);
        assert_eq!(
            fixture.vendor.calls(),
            vec!["apply_log_config", "ensure_log_index", "apply_log_dump"]
        );
        assert_eq!(fixture.applier.calls(), 1);
        assert_eq!(fixture.publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_task_is_skipped() {
        let fixture = Fixture::new().await;
        let outcome = fixture.executor().execute(Fixture::deploy_task("ghost")).await;
        assert_eq!(outcome, TransitionOutcome::Skipped);
        assert!(fixture.vendor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout_spares_waiting_tasks() {
        let fixture = Fixture::new().await;
        let stale = Utc::now() - chrono::Duration::minutes(11);
        fixture
            .insert(
                Fixture::deploy_task("approving")
                    .with_status(TaskStatus::PendingApproval)
                    .with_approval(ApprovalType::Default, ApprovalStatus::Approving)
                    .with_updated_at(stale),
            )
            .await;
        fixture
            .insert(
                Fixture::deploy_task("later")
                    .with_status(TaskStatus::Approved)
                    .scheduled_at(Utc::now() + chrono::Duration::hours(1))
                    .with_updated_at(stale),
            )
            .await;

        let (outcome, task) = run(&fixture, "approving").await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
        assert_eq!(task.status, TaskStatus::PendingApproval);

        let (outcome, task) = run(&fixture, "later").await;
        assert_eq!(outcome, TransitionOutcome::Waiting);
        assert_eq!(task.status, TaskStatus::Approved);
        assert!(fixture.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout_fails_approved_task_that_is_due() {
        let fixture = Fixture::new().await;
        fixture
            .insert(
                Fixture::deploy_task("t1")
                    .with_status(TaskStatus::Approved)
                    .with_updated_at(Utc::now() - chrono::Duration::minutes(11)),
            )
            .await;

        let (_, task) = run(&fixture, "t1").await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(fixture.vendor.calls().is_empty());
    }
}
