//! JSON 状態スナップショット
//!
//! デーモン起動時にインメモリストアへ読み込み、停止時に書き戻す。
//! 書き込みは一時ファイル経由で、バックアップを1世代残す。

use crate::error::{CoreError, Result};
use crate::model::{AppDetail, LogStreamRecord, ProjectDetail, Task, TeamDetail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;

/// ローカルストアのシリアライズ内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub streams: Vec<LogStreamRecord>,
    #[serde(default)]
    pub apps: Vec<AppDetail>,
    #[serde(default)]
    pub projects: Vec<ProjectDetail>,
    #[serde(default)]
    pub teams: Vec<TeamDetail>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            tasks: Vec::new(),
            streams: Vec::new(),
            apps: Vec::new(),
            projects: Vec::new(),
            teams: Vec::new(),
        }
    }
}

/// スナップショットファイルの読み書き
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.backup")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// スナップショットを読み込む (ファイルが無ければ空)
    pub async fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            tracing::debug!("State file {} not found, starting empty", self.path.display());
            return Ok(StateSnapshot::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)?;

        if snapshot.version > STATE_VERSION {
            return Err(CoreError::UnsupportedStateVersion {
                found: snapshot.version,
                supported: STATE_VERSION,
            });
        }

        Ok(snapshot)
    }

    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut snapshot = snapshot.clone();
        snapshot.version = STATE_VERSION;
        snapshot.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(&snapshot)?;

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).await?;
        }

        let temp = self.temp_path();
        fs::write(&temp, content).await?;
        fs::rename(&temp, &self.path).await?;

        tracing::debug!(
            "Saved state ({} tasks, {} streams) to {}",
            snapshot.tasks.len(),
            snapshot.streams.len(),
            self.path.display()
        );
        Ok(())
    }
}
