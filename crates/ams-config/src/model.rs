//! 設定の型定義

use crate::error::{ConfigError, Result};
use ams_cloud::{ClusterConfig, VendorName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmsConfig {
    pub scheduler: SchedulerConfig,
    pub vendors: Vec<VendorConfig>,
    /// 環境 -> クラスタ一覧
    pub clusters: BTreeMap<String, Vec<ClusterEntry>>,
    pub consumers: ConsumersConfig,
    pub console: ConsoleConfig,
    /// インメモリストアの初期値兼保存先となる JSON スナップショット
    pub state_file: Option<PathBuf>,
}

/// 前の tick が終わる前に次の tick が来たときの扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    #[default]
    Skip,
    /// tick を並行実行する (上限は `max_concurrency`)
    Overlap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategyConfig {
    /// 条件を満たす tick ごとに再試行
    #[default]
    Polling,
    ExponentialBackoff {
        base_ms: u64,
        max_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_ms: u64,
    pub due_window_secs: u64,
    pub max_concurrency: usize,
    pub overrun_policy: OverrunPolicy,
    pub query_timeout_ms: u64,
    pub unit_timeout_secs: Option<u64>,
    pub max_retry_count: u32,
    pub stage_timeout_secs: u64,
    pub retry_strategy: RetryStrategyConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            due_window_secs: 5,
            max_concurrency: 32,
            overrun_policy: OverrunPolicy::Skip,
            query_timeout_ms: 5000,
            unit_timeout_secs: None,
            max_retry_count: 10,
            stage_timeout_secs: 600,
            retry_strategy: RetryStrategyConfig::Polling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorConfig {
    pub name: VendorName,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    /// リージョン ID (Huawei ではリージョンのプロジェクト ID)
    #[serde(default)]
    pub region_id: String,
    #[serde(default)]
    pub log_endpoint: String,
    #[serde(default)]
    pub registry_endpoint: String,
    #[serde(default = "default_registry_namespace")]
    pub registry_namespace: String,
    #[serde(default)]
    pub disable_log_config: bool,
}

fn default_registry_namespace() -> String {
    "qt-apps".to_string()
}

/// AMS のクラスタとベンダー側の識別子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    pub vendor: VendorName,
    #[serde(flatten)]
    pub vendor_settings: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerGroupConfig {
    pub group_id: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumersConfig {
    pub app_op: ConsumerGroupConfig,
    pub approval: ConsumerGroupConfig,
    /// プロセス内バスのトピックあたりパーティション数
    pub partitions: usize,
}

impl Default for ConsumersConfig {
    fn default() -> Self {
        Self {
            app_op: ConsumerGroupConfig {
                group_id: "ams-app-op".to_string(),
                topics: vec!["ams-app-op".to_string()],
            },
            approval: ConsumerGroupConfig {
                group_id: "ams-approval".to_string(),
                topics: vec!["ams-approval-callback".to_string()],
            },
            partitions: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub huawei_console_url: String,
    pub aliyun_sls_console_url: String,
    pub aliyun_log_project_stg: String,
    pub aliyun_log_project_prd: String,
    /// Huawei のログストリーム名に付けるプレフィックス
    pub stream_name_prefix: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            huawei_console_url: "https://console.huaweicloud.com".to_string(),
            aliyun_sls_console_url: "https://sls.console.aliyun.com".to_string(),
            aliyun_log_project_stg: String::new(),
            aliyun_log_project_prd: String::new(),
            stream_name_prefix: String::new(),
        }
    }
}

impl AmsConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.interval_ms は 1 以上にしてください".to_string(),
            ));
        }
        if s.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_concurrency は 1 以上にしてください".to_string(),
            ));
        }
        if s.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.query_timeout_ms は 1 以上にしてください".to_string(),
            ));
        }
        if s.unit_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.unit_timeout_secs は 1 以上にしてください".to_string(),
            ));
        }
        if let RetryStrategyConfig::ExponentialBackoff { base_ms, max_ms, .. } = s.retry_strategy {
            if base_ms == 0 || max_ms < base_ms {
                return Err(ConfigError::Invalid(format!(
                    "scheduler.retry_strategy は 0 < base_ms <= max_ms にしてください (base_ms: {}, max_ms: {})",
                    base_ms, max_ms
                )));
            }
        }
        if self.consumers.partitions == 0 {
            return Err(ConfigError::Invalid(
                "consumers.partitions は 1 以上にしてください".to_string(),
            ));
        }

        let mut vendors = HashSet::new();
        for vendor in &self.vendors {
            if !vendors.insert(vendor.name) {
                return Err(ConfigError::Invalid(format!(
                    "ベンダー {} が重複しています",
                    vendor.name
                )));
            }
        }

        for (env, clusters) in &self.clusters {
            let mut names = HashSet::new();
            for cluster in clusters {
                if !names.insert(cluster.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "環境 {} にクラスタ {} が重複しています",
                        env, cluster.name
                    )));
                }
                if !vendors.contains(&cluster.vendor) {
                    return Err(ConfigError::Invalid(format!(
                        "環境 {} のクラスタ {} が未設定のベンダー {} を参照しています",
                        env, cluster.name, cluster.vendor
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn vendor(&self, name: VendorName) -> Option<&VendorConfig> {
        self.vendors.iter().find(|v| v.name == name)
    }

    /// `vendor` が担当する (環境, クラスタ) の組
    pub fn clusters_of(&self, vendor: VendorName) -> impl Iterator<Item = (&str, &ClusterEntry)> {
        self.clusters.iter().flat_map(move |(env, clusters)| {
            clusters
                .iter()
                .filter(move |c| c.vendor == vendor)
                .map(move |c| (env.as_str(), c))
        })
    }
}
