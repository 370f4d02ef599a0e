//! コアのエラー型

use thiserror::Error;

/// タスクモデルとローカルストアのエラー
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("無効なタスク検索条件: {0}")]
    InputValidation(String),

    #[error("見つかりません: {0}")]
    NotFound(String),

    #[error("永続化エラー: {0}")]
    Persistence(String),

    #[error("状態ファイルのバージョン {found} は未対応です (対応: {supported} まで)")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
