//! コンシューマグループ
//!
//! パーティションごとに順番に処理し、結果にかかわらず必ずコミットする。

use crate::error::ConsumerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

/// 配信された1メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: Vec<u8>,
}

/// 1種類のイベントのメッセージをデコードして処理する
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &Message) -> Result<(), ConsumerError>;
}

/// 1コンシューマが占有する、トピックの1パーティション
#[async_trait]
pub trait PartitionClaim: Send {
    fn topic(&self) -> &str;

    fn partition(&self) -> i32;

    /// 次のメッセージ (パーティションが閉じたら `None`)
    async fn next(&mut self) -> Option<Message>;

    /// `message` をグループの処理済みとして記録
    async fn commit(&mut self, message: &Message) -> Result<(), ConsumerError>;
}

/// コンシューマグループにパーティションを割り当てる
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn claim(
        &self,
        group_id: &str,
        topics: &[String],
    ) -> Result<Vec<Box<dyn PartitionClaim>>, ConsumerError>;
}

/// 1つのハンドラに紐づくコンシューマグループ
pub struct ConsumerGroup {
    group_id: String,
    topics: Vec<String>,
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
}

impl ConsumerGroup {
    pub fn new(
        group_id: impl Into<String>,
        topics: Vec<String>,
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            source,
            handler,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// `shutdown` まで、割り当てられた各パーティションを個別のタスクで処理
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        let claims = self.source.claim(&self.group_id, &self.topics).await?;
        info!(
            group_id = %self.group_id,
            handler = self.handler.name(),
            topics = ?self.topics,
            partitions = claims.len(),
            "Consumer group started"
        );

        let mut drains = JoinSet::new();
        for claim in claims {
            drains.spawn(drain(claim, Arc::clone(&self.handler), shutdown.clone()));
        }
        while let Some(joined) = drains.join_next().await {
            if let Err(err) = joined {
                error!(group_id = %self.group_id, error = %err, "Partition drain aborted");
            }
        }

        info!(group_id = %self.group_id, "Consumer group stopped");
        Ok(())
    }
}

/// クローズか `shutdown` まで、1パーティションのメッセージを順に処理
pub async fn drain(
    mut claim: Box<dyn PartitionClaim>,
    handler: Arc<dyn MessageHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = claim.next() => message,
        };
        let Some(message) = message else {
            break;
        };
        process(claim.as_mut(), handler.as_ref(), message).await;
    }
}

/// 1メッセージを処理し、ハンドラの結果にかかわらずコミット
pub async fn process(claim: &mut dyn PartitionClaim, handler: &dyn MessageHandler, message: Message) {
    let correlation_id = uuid::Uuid::new_v4().simple().to_string();
    let span = info_span!(
        "message",
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        correlation_id = %correlation_id,
    );

    async {
        info!(handler = handler.name(), bytes = message.value.len(), "Message received");
        if let Err(err) = handler.handle(&message).await {
            error!(handler = handler.name(), error = %err, "Message handler failed");
        }
        if let Err(err) = claim.commit(&message).await {
            error!(error = %err, "Failed to commit message");
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedClaim {
        pending: VecDeque<Message>,
        commits: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl PartitionClaim for ScriptedClaim {
        fn topic(&self) -> &str {
            "ams-app-op"
        }

        fn partition(&self) -> i32 {
            0
        }

        async fn next(&mut self) -> Option<Message> {
            self.pending.pop_front()
        }

        async fn commit(&mut self, message: &Message) -> Result<(), ConsumerError> {
            self.commits.lock().unwrap().push(message.offset);
            Ok(())
        }
    }

    /// 奇数オフセットで失敗し、処理したオフセットを記録
    #[derive(Default)]
    struct OddFails {
        handled: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MessageHandler for OddFails {
        fn name(&self) -> &'static str {
            "odd-fails"
        }

        async fn handle(&self, message: &Message) -> Result<(), ConsumerError> {
            self.handled.lock().unwrap().push(message.offset);
            if message.offset % 2 == 1 {
                return Err(ConsumerError::TaskNotFound(message.offset.to_string()));
            }
            Ok(())
        }
    }

    fn message(offset: i64) -> Message {
        Message {
            topic: "ams-app-op".to_string(),
            partition: 0,
            offset,
            key: None,
            value: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_every_message_is_committed_once_in_order() {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let claim = ScriptedClaim {
            pending: (0..6).map(message).collect(),
            commits: commits.clone(),
        };
        let handler = Arc::new(OddFails::default());

        drain(Box::new(claim), handler.clone(), CancellationToken::new()).await;

        assert_eq!(*handler.handled.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(*commits.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_drain_stops() {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let claim = ScriptedClaim {
            pending: (0..3).map(message).collect(),
            commits: commits.clone(),
        };
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        drain(Box::new(claim), Arc::new(OddFails::default()), shutdown).await;
        assert!(commits.lock().unwrap().is_empty());
    }
}
