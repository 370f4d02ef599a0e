//! プロセス内のタスク単位ロック

use ams_core::TaskId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// 遷移処理中のタスク ID 集合
///
/// このプロセス内のユニットしか守らない。別インスタンスのスケジューラは排除できない。
#[derive(Debug, Clone, Default)]
pub struct TaskLocks {
    held: Arc<Mutex<HashSet<TaskId>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id` のロックを取る (他のユニットが保持中なら `None`)
    pub fn try_acquire(&self, id: &TaskId) -> Option<TaskLockGuard> {
        if self.held().insert(id.clone()) {
            Some(TaskLockGuard {
                locks: self.clone(),
                id: id.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, id: &TaskId) -> bool {
        self.held().contains(id)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<TaskId>> {
        match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// drop でタスクロックを解放
#[derive(Debug)]
pub struct TaskLockGuard {
    locks: TaskLocks,
    id: TaskId,
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        self.locks.held().remove(&self.id);
    }
}
