//! 一定間隔でコホートを問い合わせるスケジューラ

use crate::error::{ControlPlaneError, Result};
use crate::executor::{TransitionExecutor, TransitionOutcome};
use ams_config::{OverrunPolicy, SchedulerConfig};
use ams_core::{Cohort, Task};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// 予約時刻をどこまで過ぎても拾うか
    pub due_window: chrono::Duration,
    /// 同時実行ユニット数 (重なった tick も合算)
    pub max_concurrency: usize,
    pub overrun_policy: OverrunPolicy,
    /// コホート検索ごとの期限
    pub query_timeout: Duration,
    /// ユニットごとの期限 (`None` なら完了まで待つ)
    pub unit_timeout: Option<Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            due_window: chrono::Duration::seconds(
                i64::try_from(config.due_window_secs).unwrap_or(i64::MAX / 1000),
            ),
            max_concurrency: config.max_concurrency.max(1),
            overrun_policy: config.overrun_policy,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            unit_timeout: config.unit_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// 1 tick の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub advanced: usize,
    pub retrying: usize,
    pub waiting: usize,
    pub locked: usize,
    pub skipped: usize,
    pub timed_out: usize,
    /// panic したユニット
    pub aborted: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &TransitionOutcome) {
        match outcome {
            TransitionOutcome::Advanced { .. } => self.advanced += 1,
            TransitionOutcome::Retrying(_) => self.retrying += 1,
            TransitionOutcome::Waiting => self.waiting += 1,
            TransitionOutcome::Locked => self.locked += 1,
            TransitionOutcome::Skipped => self.skipped += 1,
            TransitionOutcome::TimedOut => self.timed_out += 1,
        }
    }
}

/// スケジューラ作成以降の tick カウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks_started: u64,
    /// 前の tick が実行中だったため見送った tick
    pub ticks_skipped: u64,
    /// コホート検索の失敗で中止した tick
    pub ticks_abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    skipped: AtomicU64,
    abandoned: AtomicU64,
}

/// タイマーでコホートを問い合わせ、各タスクをエグゼキュータに振り分ける
///
/// ユニットは `max_concurrency` 個の許可を持つセマフォの下でそれぞれ別タスクとして
/// 動く。ユニットの失敗は他に影響しないが、コホート検索の失敗は tick 全体を中止する。
pub struct Scheduler {
    executor: Arc<TransitionExecutor>,
    settings: SchedulerSettings,
    permits: Arc<Semaphore>,
    tick_running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Scheduler {
    pub fn new(executor: Arc<TransitionExecutor>, settings: SchedulerSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            executor,
            settings,
            permits,
            tick_running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks_started: self.counters.started.load(Ordering::SeqCst),
            ticks_skipped: self.counters.skipped.load(Ordering::SeqCst),
            ticks_abandoned: self.counters.abandoned.load(Ordering::SeqCst),
        }
    }

    /// `shutdown` まで tick を回し、実行中の tick を待って終わる
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            max_concurrency = self.settings.max_concurrency,
            overrun_policy = ?self.settings.overrun_policy,
            "Scheduler started"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            while ticks.try_join_next().is_some() {}

            let guard = match self.settings.overrun_policy {
                OverrunPolicy::Skip => match TickGuard::try_enter(&self.tick_running) {
                    Some(guard) => Some(guard),
                    None => {
                        self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                        debug!("Previous tick still running, skipping this one");
                        continue;
                    }
                },
                OverrunPolicy::Overlap => None,
            };

            let scheduler = Arc::clone(&self);
            ticks.spawn(async move {
                let _guard = guard;
                if let Err(err) = scheduler.run_tick().await {
                    error!(error = %err, "Tick abandoned");
                }
            });
        }

        info!(running_ticks = ticks.len(), "Scheduler stopping");
        while ticks.join_next().await.is_some() {}
        info!("Scheduler stopped");
    }

    /// 全コホートを検索し、タスクごとにユニットを実行して全完了を待つ
    pub async fn run_tick(&self) -> Result<TickReport> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        let worklist = match self.collect().await {
            Ok(worklist) => worklist,
            Err(err) => {
                self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
                return Err(err);
            }
        };

        let mut report = TickReport {
            dispatched: worklist.len(),
            ..TickReport::default()
        };
        let mut units = JoinSet::new();
        for task in worklist {
            units.spawn(self.unit(task));
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(err) => {
                    error!(error = %err, "Task unit aborted");
                    report.aborted += 1;
                }
            }
        }

        debug!(?report, "Tick finished");
        Ok(report)
    }

    async fn collect(&self) -> Result<Vec<Task>> {
        let now = Utc::now();
        let tasks = &self.executor.services().tasks;
        let mut worklist = Vec::new();

        for cohort in Cohort::ALL {
            let query = cohort.query(now, self.settings.due_window);
            let found = tokio::time::timeout(self.settings.query_timeout, tasks.query_tasks(&query))
                .await
                .map_err(|_| ControlPlaneError::CohortTimeout(cohort))?
                .map_err(|source| ControlPlaneError::CohortQuery { cohort, source })?;
            debug!(%cohort, count = found.len(), "Cohort queried");
            worklist.extend(found);
        }

        Ok(worklist)
    }

    fn unit(&self, task: Task) -> impl std::future::Future<Output = TransitionOutcome> + Send + 'static {
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let unit_timeout = self.settings.unit_timeout;
        let correlation_id = uuid::Uuid::new_v4().simple().to_string();
        let span = info_span!("task", task_id = %task.id, correlation_id = %correlation_id);

        async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return TransitionOutcome::Skipped;
            };
            match unit_timeout {
                Some(limit) => match tokio::time::timeout(limit, executor.execute(task)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(timeout_secs = limit.as_secs(), "Task unit timed out");
                        TransitionOutcome::TimedOut
                    }
                },
                None => executor.execute(task).await,
            }
        }
        .instrument(span)
    }
}

/// drop されるまで tick を実行中として印を付ける
struct TickGuard(Arc<AtomicBool>);

impl TickGuard {
    fn try_enter(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
