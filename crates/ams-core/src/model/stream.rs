//! ベンダー側ログストリームのローカル記録

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ログストリームのキー (アプリ・クラスタ・環境ごとに1つ)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub app_id: String,
    pub cluster_name: String,
    pub env_name: String,
}

impl StreamKey {
    pub fn new(
        app_id: impl Into<String>,
        cluster_name: impl Into<String>,
        env_name: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            cluster_name: cluster_name.into(),
            env_name: env_name.into(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_id, self.env_name, self.cluster_name)
    }
}

/// ベンダーが払い出したストリーム ID とマッピングルール ID
///
/// ストリーム ID はルール作成より前に保存すること。ベンダー API に名前での
/// 取得が無いため、失った ID は一覧の走査でしか取り戻せない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStreamRecord {
    pub key: StreamKey,
    pub stream_name: String,
    pub stream_id: String,
    #[serde(default)]
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogStreamRecord {
    pub fn new(
        key: StreamKey,
        stream_name: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            stream_name: stream_name.into(),
            stream_id: stream_id.into(),
            rule_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
