//! Vendor controller trait definition

use crate::error::Result;
use ams_core::{AppDetail, ProjectDetail, Task, TeamDetail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported cloud vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorName {
    Huawei,
    Aliyun,
}

impl fmt::Display for VendorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorName::Huawei => write!(f, "huawei"),
            VendorName::Aliyun => write!(f, "aliyun"),
        }
    }
}

impl FromStr for VendorName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "huawei" => Ok(VendorName::Huawei),
            "aliyun" | "ali" => Ok(VendorName::Aliyun),
            other => Err(format!("unknown vendor: {}", other)),
        }
    }
}

/// Log viewer links for one app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStoreUrls {
    /// Logs of this app only
    pub url: String,
    /// Project-wide store, filtered to this app where the vendor supports it
    pub project_url: String,
}

/// Paged registry tag lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTagsQuery {
    /// Repository name (the project name)
    pub project_name: String,
    /// 1-based page number
    pub page: u32,
    pub size: u32,
}

impl RepoTagsQuery {
    pub fn new(project_name: impl Into<String>, page: u32, size: u32) -> Self {
        Self {
            project_name: project_name.into(),
            page,
            size,
        }
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTag {
    pub image_id: String,
    pub tag: String,
    pub repo_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size: i64,
    pub digest: String,
}

/// One page of tags plus the total number of images in the repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoTagPage {
    pub tags: Vec<RepoTag>,
    pub total: usize,
}

/// Cloud vendor capability set
///
/// A partial vendor returns [`crate::CloudError::Unsupported`] for operations
/// it does not implement.
#[async_trait]
pub trait VendorController: Send + Sync {
    fn name(&self) -> VendorName;

    /// Vendor region (or region project) this controller talks to
    fn region(&self) -> &str;

    /// Ensure the log stream and its mapping rule exist for the task's app,
    /// cluster and env
    async fn apply_log_config(
        &self,
        project: &ProjectDetail,
        app: &AppDetail,
        task: &Task,
        team: &TeamDetail,
    ) -> Result<()>;

    /// Remove the mapping rule, then the stream; absent resources are fine
    async fn delete_log_config(&self, cluster: &str, env: &str, app_id: &str) -> Result<()>;

    async fn ensure_log_index(&self, cluster: &str, env: &str, app: &AppDetail) -> Result<()>;

    async fn apply_log_dump(&self, cluster: &str, env: &str, app_id: &str) -> Result<()>;

    async fn delete_log_dump(&self, cluster: &str, env: &str, app_id: &str) -> Result<()>;

    /// Compose viewer URLs from locally known identifiers only
    async fn get_log_store_url(
        &self,
        cluster: &str,
        project: &ProjectDetail,
        app: &AppDetail,
        env: &str,
    ) -> Result<LogStoreUrls>;

    /// List image tags; a missing repository yields an empty page
    async fn get_repo_tags(&self, query: &RepoTagsQuery) -> Result<RepoTagPage>;
}
