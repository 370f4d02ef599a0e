//! `amsd check-config`

use ams_cloud::VendorName;
use ams_config::{AmsConfig, RetryStrategyConfig};
use colored::Colorize;
use std::path::Path;

pub fn check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let (path, config) = match ams_config::load_from(path) {
        Ok(loaded) => loaded,
        Err(err) => {
            println!("{} {}", "✗".red().bold(), err);
            return Err(err.into());
        }
    };

    println!(
        "{} {}",
        "✓ 設定は有効です:".green().bold(),
        path.display().to_string().cyan()
    );
    println!();
    for line in summary(&config) {
        println!("{}", line);
    }
    for warning in warnings(&config) {
        println!("{} {}", "⚠".yellow(), warning.yellow());
    }
    Ok(())
}

fn summary(config: &AmsConfig) -> Vec<String> {
    let s = &config.scheduler;
    let retry = match s.retry_strategy {
        RetryStrategyConfig::Polling => "ポーリング".to_string(),
        RetryStrategyConfig::ExponentialBackoff {
            base_ms,
            max_ms,
            jitter,
        } => format!(
            "指数バックオフ {}ms..{}ms{}",
            base_ms,
            max_ms,
            if jitter { " (ジッターあり)" } else { "" }
        ),
    };

    let mut lines = vec![
        "スケジューラ".bold().to_string(),
        format!(
            "  間隔 {}ms, 猶予ウィンドウ {}s, 最大同時実行 {}, オーバーラン {:?}",
            s.interval_ms, s.due_window_secs, s.max_concurrency, s.overrun_policy
        ),
        format!(
            "  リトライ: {} (上限 {}回), ステージタイムアウト {}s",
            retry, s.max_retry_count, s.stage_timeout_secs
        ),
        "ベンダー".bold().to_string(),
    ];
    for vendor in &config.vendors {
        let clusters = config.clusters_of(vendor.name).count();
        let log_config = if vendor.disable_log_config {
            " (ログ設定無効)"
        } else {
            ""
        };
        lines.push(format!(
            "  {} リージョン {}, クラスタ {}件{}",
            vendor.name, vendor.region_id, clusters, log_config
        ));
    }
    lines.push("クラスタ".bold().to_string());
    for (env, clusters) in &config.clusters {
        let names: Vec<String> = clusters
            .iter()
            .map(|c| format!("{} ({})", c.name, c.vendor))
            .collect();
        lines.push(format!("  {}: {}", env, names.join(", ")));
    }
    lines.push("コンシューマ".bold().to_string());
    for (label, group) in [("app-op", &config.consumers.app_op), ("approval", &config.consumers.approval)] {
        lines.push(format!(
            "  {} グループ {} <- {}",
            label,
            group.group_id,
            group.topics.join(", ")
        ));
    }
    lines
}

/// 読み込みは通るが実行時に失敗する設定
fn warnings(config: &AmsConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    for vendor in &config.vendors {
        if vendor.name == VendorName::Huawei {
            if vendor.log_endpoint.is_empty() || vendor.registry_endpoint.is_empty() {
                warnings.push("huawei: log_endpoint と registry_endpoint が必要です".to_string());
            }
            if vendor.access_key_id.is_empty() || vendor.access_key_secret.is_empty() {
                warnings.push("huawei: アクセスキーが設定されていません".to_string());
            }
        }
    }
    for (env, cluster) in config.clusters_of(VendorName::Huawei) {
        if cluster.vendor_settings.log_group_id.is_empty() {
            warnings.push(format!(
                "環境 {} のクラスタ {} に log_group_id がありません",
                env, cluster.name
            ));
        }
    }
    if config.consumers.app_op.topics.is_empty() {
        warnings.push("consumers.app_op にトピックがありません".to_string());
    }
    warnings
}
