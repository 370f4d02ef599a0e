//! Per-env cluster settings known to a vendor controller

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Vendor-side identifiers of one AMS cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub cluster_id: String,
    /// Cluster name as the vendor knows it (differs from the AMS name)
    pub cluster_name_in_vendor: String,
    pub log_group_id: String,
    pub log_group_name: String,
    pub region: String,
}

/// env -> cluster name -> settings
#[derive(Debug, Clone, Default)]
pub struct ClusterMap {
    envs: HashMap<String, HashMap<String, ClusterConfig>>,
}

impl ClusterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        env: impl Into<String>,
        cluster: impl Into<String>,
        config: ClusterConfig,
    ) {
        self.envs
            .entry(env.into())
            .or_default()
            .insert(cluster.into(), config);
    }

    pub fn with(mut self, env: &str, cluster: &str, config: ClusterConfig) -> Self {
        self.insert(env, cluster, config);
        self
    }

    pub fn get(&self, env: &str, cluster: &str) -> Result<&ClusterConfig> {
        self.envs
            .get(env)
            .and_then(|clusters| clusters.get(cluster))
            .ok_or_else(|| CloudError::ClusterNotConfigured {
                env: env.to_string(),
                cluster: cluster.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }
}
