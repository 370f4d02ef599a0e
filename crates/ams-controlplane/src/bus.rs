//! プロセス内メッセージバス
//!
//! トピックは固定数の追記専用パーティションに分かれる。キー付きメッセージは
//! 常に同じパーティションに入り、コミット済みオフセットはグループごとに持つ。

use crate::consumer::{Message, MessageSource, PartitionClaim};
use crate::error::{ConsumerError, ControlPlaneError, Result};
use crate::events::{AppOpEvent, EventPublisher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
struct PartitionLog {
    messages: Mutex<Vec<Message>>,
    appended: Notify,
}

#[derive(Debug)]
struct Topic {
    partitions: Vec<Arc<PartitionLog>>,
    round_robin: AtomicUsize,
}

impl Topic {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Arc::default()).collect(),
            round_robin: AtomicUsize::new(0),
        }
    }

    fn partition_for(&self, key: Option<&str>) -> usize {
        let n = self.partitions.len();
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % n as u64) as usize
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % n,
        }
    }
}

type OffsetKey = (String, String, i32);

#[derive(Debug)]
pub struct InProcessBus {
    partitions: usize,
    topics: Mutex<HashMap<String, Arc<Topic>>>,
    /// (グループ, トピック, パーティション) -> 次に読むオフセット
    committed: Arc<Mutex<HashMap<OffsetKey, i64>>>,
}

impl InProcessBus {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            topics: Mutex::new(HashMap::new()),
            committed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        lock(&self.topics)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(self.partitions)))
            .clone()
    }

    /// メッセージを追記し (パーティション, オフセット) を返す
    pub fn publish(&self, topic: &str, key: Option<&str>, value: Vec<u8>) -> (i32, i64) {
        let handle = self.topic(topic);
        let index = handle.partition_for(key);
        let log = &handle.partitions[index];
        let partition = index as i32;

        let offset = {
            let mut messages = lock(&log.messages);
            let offset = messages.len() as i64;
            messages.push(Message {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.map(str::to_string),
                value,
            });
            offset
        };
        log.appended.notify_waiters();
        (partition, offset)
    }

    /// `group_id` が次に読むオフセット
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> i64 {
        lock(&self.committed)
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// トピックに追記された全パーティション合計のメッセージ数
    pub fn len(&self, topic: &str) -> usize {
        self.topic(topic)
            .partitions
            .iter()
            .map(|p| lock(&p.messages).len())
            .sum()
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

struct BusClaim {
    group_id: String,
    topic: String,
    partition: i32,
    position: i64,
    log: Arc<PartitionLog>,
    committed: Arc<Mutex<HashMap<OffsetKey, i64>>>,
}

#[async_trait]
impl PartitionClaim for BusClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next(&mut self) -> Option<Message> {
        loop {
            let appended = self.log.appended.notified();
            let next = usize::try_from(self.position)
                .ok()
                .and_then(|at| lock(&self.log.messages).get(at).cloned());
            if let Some(message) = next {
                self.position += 1;
                return Some(message);
            }
            appended.await;
        }
    }

    async fn commit(&mut self, message: &Message) -> std::result::Result<(), ConsumerError> {
        if message.topic != self.topic || message.partition != self.partition {
            return Err(ConsumerError::Commit(format!(
                "message from {}/{} committed on claim {}/{}",
                message.topic, message.partition, self.topic, self.partition
            )));
        }
        let key = (self.group_id.clone(), self.topic.clone(), self.partition);
        let mut committed = lock(&self.committed);
        let next = committed.entry(key).or_insert(0);
        *next = (*next).max(message.offset + 1);
        Ok(())
    }
}

#[async_trait]
impl MessageSource for InProcessBus {
    async fn claim(
        &self,
        group_id: &str,
        topics: &[String],
    ) -> std::result::Result<Vec<Box<dyn PartitionClaim>>, ConsumerError> {
        let mut claims: Vec<Box<dyn PartitionClaim>> = Vec::new();
        for topic in topics {
            let handle = self.topic(topic);
            for (index, log) in handle.partitions.iter().enumerate() {
                let partition = index as i32;
                claims.push(Box::new(BusClaim {
                    group_id: group_id.to_string(),
                    topic: topic.clone(),
                    partition,
                    position: self.committed_offset(group_id, topic, partition),
                    log: Arc::clone(log),
                    committed: Arc::clone(&self.committed),
                }));
            }
        }
        Ok(claims)
    }
}

/// アプリ操作イベントをタスク ID をキーにバスへ発行する
pub struct BusEventPublisher {
    bus: Arc<InProcessBus>,
    topic: String,
}

impl BusEventPublisher {
    pub fn new(bus: Arc<InProcessBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for BusEventPublisher {
    async fn publish_app_op(&self, event: &AppOpEvent) -> Result<()> {
        let value =
            serde_json::to_vec(event).map_err(|err| ControlPlaneError::Publish(err.to_string()))?;
        let (partition, offset) = self.bus.publish(&self.topic, Some(&event.task_id), value);
        tracing::debug!(topic = %self.topic, partition, offset, task_id = %event.task_id, "App operation event published");
        Ok(())
    }
}
