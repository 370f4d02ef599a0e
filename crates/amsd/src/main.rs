mod check;
mod daemon;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amsd")]
#[command(about = "AMS デプロイタスクのリコンサイルデーモン", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ctrl-C までスケジューラと2つのコンシューマグループを動かす
    Run {
        /// 設定ファイル (省略時は探索した ams.yaml)
        #[arg(short, long, env = "AMS_CONFIG_PATH")]
        config: Option<PathBuf>,
        /// ログの出力形式
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// 設定を読み込んで検証し、概要を表示する
    CheckConfig {
        #[arg(short, long, env = "AMS_CONFIG_PATH")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { config } => {
            init_tracing(LogFormat::Text);
            check::check_config(config.as_deref())
        }
        Commands::Run { config, log_format } => {
            init_tracing(log_format);
            let (path, config) = ams_config::load_from(config.as_deref())?;
            tracing::info!(config = %path.display(), "Configuration loaded");

            let daemon = daemon::Daemon::build(&config).await?;
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
                    Err(err) => tracing::error!(error = %err, "Failed to listen for Ctrl-C"),
                }
                signal.cancel();
            });

            daemon.run(shutdown).await
        }
    }
}
