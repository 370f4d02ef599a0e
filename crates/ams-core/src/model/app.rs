//! プロジェクト・アプリ・チームの記述子
//!
//! 管理は CRUD 層が行い、リコンサイルのコアは読むだけ。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub id: String,
    pub name: String,
    pub team_id: String,
    /// プロジェクト内の全アプリをまとめた Aliyun ログストア
    #[serde(default)]
    pub log_store_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDetail {
    pub id: String,
    pub name: String,
    pub project_id: String,
    /// ログ保持日数 (`None` ならベンダーのデフォルト)
    #[serde(default)]
    pub log_ttl_in_days: Option<u32>,
    /// 環境ごとのログストア名 (Aliyun)
    #[serde(default)]
    pub log_store_names: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDetail {
    pub id: String,
    pub name: String,
}

impl AppDetail {
    /// このアプリの Pod が使うコンテナ名
    pub fn container_name(&self, project: &ProjectDetail) -> String {
        format!("{}-{}", project.name, self.name)
    }
}
