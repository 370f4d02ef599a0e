//! 失敗した遷移のリトライ戦略

use ams_config::RetryStrategyConfig;
use ams_core::{Task, TaskId};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// 失敗したタスクを再び実行対象にするタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// タスクが選ばれた次の tick で再試行
    #[default]
    Polling,
    /// 最後の失敗から `base * 2^(retries - 1)` 待つ (上限 `max`)
    ExponentialBackoff {
        base: Duration,
        max: Duration,
        /// Equal jitter (同じタスク・リトライ回数なら同じ値)
        jitter: bool,
    },
}

impl From<&RetryStrategyConfig> for RetryStrategy {
    fn from(config: &RetryStrategyConfig) -> Self {
        match *config {
            RetryStrategyConfig::Polling => RetryStrategy::Polling,
            RetryStrategyConfig::ExponentialBackoff {
                base_ms,
                max_ms,
                jitter,
            } => RetryStrategy::ExponentialBackoff {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
                jitter,
            },
        }
    }
}

impl RetryStrategy {
    /// 次の試行までの待ち時間 (待つ必要が無ければ `None`)
    pub fn backoff(&self, task_id: &TaskId, retry_count: u32) -> Option<Duration> {
        let RetryStrategy::ExponentialBackoff { base, max, jitter } = *self else {
            return None;
        };
        if retry_count == 0 {
            return None;
        }

        let factor = 1u32.checked_shl(retry_count - 1).unwrap_or(u32::MAX);
        let delay = base.saturating_mul(factor).min(max);
        if !jitter {
            return Some(delay);
        }

        let half = delay / 2;
        let half_ms = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
        let mut rng = StdRng::seed_from_u64(jitter_seed(task_id, retry_count));
        Some(half + Duration::from_millis(rng.gen_range(0..=half_ms)))
    }

    /// `now` 時点で試行してよければ true
    pub fn is_due(&self, task: &Task, now: DateTime<Utc>) -> bool {
        match self.backoff(&task.id, task.retry_count) {
            None => true,
            Some(delay) => match chrono::Duration::from_std(delay) {
                Ok(delay) => now >= task.updated_at + delay,
                Err(_) => false,
            },
        }
    }
}

fn jitter_seed(task_id: &TaskId, retry_count: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    task_id.hash(&mut hasher);
    retry_count.hash(&mut hasher);
    hasher.finish()
}
