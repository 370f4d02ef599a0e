//! AMS の設定
//!
//! 1つの YAML ファイルでスケジューラ、ベンダー認証情報、環境ごとのクラスタ、
//! コンシューマグループ、コンソールリンクを設定する。

pub mod error;
pub mod model;

pub use error::*;
pub use model::*;

use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "AMS_CONFIG_PATH";

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 `AMS_CONFIG_PATH` (直接パス指定)
/// 2. カレントディレクトリ: `ams.local.yaml`, `ams.yaml`
/// 3. `<設定ディレクトリ>/ams/ams.yaml` (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["ams.local.yaml", "ams.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("ams").join("ams.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 設定ファイルを読み込んで検証
pub fn load(path: impl AsRef<Path>) -> Result<AmsConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let config: AmsConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// `path` から読み込む (`None` なら探索したファイル)
pub fn load_from(path: Option<&Path>) -> Result<(PathBuf, AmsConfig)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    let config = load(&path)?;
    Ok((path, config))
}
