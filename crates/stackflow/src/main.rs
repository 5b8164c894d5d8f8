mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "宣言したとおりに、依存順で。クラウドリソースのプロビジョニング。", long_about = None)]
struct Cli {
    /// スタック定義ファイル（省略時は自動検出）
    #[arg(short, long, global = true, env = "STACK_CONFIG_PATH")]
    file: Option<PathBuf>,

    /// 使用するバックエンド
    #[arg(long, global = true, value_enum, default_value_t = Backend::Cloudflare, env = "STACK_BACKEND")]
    backend: Backend,

    /// 変数の上書き (key=value)
    #[arg(long = "var", global = true, value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// バックエンド呼び出し1回あたりのタイムアウト（秒）
    #[arg(long, global = true, default_value_t = 60)]
    timeout: u64,

    /// 一時的な失敗に対する最大試行回数
    #[arg(long, global = true, default_value_t = 3)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタック定義を検証し、適用順を表示
    Validate,
    /// 適用時に行われる変更を表示（変更は行わない）
    Plan,
    /// スタックを適用
    Up {
        /// シークレットな出力値をそのまま表示
        #[arg(long)]
        show_secrets: bool,
    },
    /// スタックのリソースを削除（保護・インポート済みは残す）
    Down {
        /// 確認なしで削除する
        #[arg(short, long)]
        yes: bool,
    },
    /// 保存済みの状態から出力値を表示
    Outputs {
        /// シークレットな出力値をそのまま表示
        #[arg(long)]
        show_secrets: bool,
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Cloudflare REST API
    Cloudflare,
    /// プロセス内のメモリ（ドライラン用）
    Memory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr に出力（RUST_LOG で調整）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let options = utils::RunOptions {
        backend: cli.backend,
        timeout: std::time::Duration::from_secs(cli.timeout),
        max_attempts: cli.max_attempts.max(1),
    };
    let load = || utils::load_stack(cli.file.as_deref(), &cli.vars);

    match cli.command {
        Commands::Validate => commands::validate::handle(&load()?)?,
        Commands::Plan => commands::plan::handle(&load()?, &options).await?,
        Commands::Up { show_secrets } => {
            commands::up::handle(&load()?, &options, show_secrets).await?
        }
        Commands::Down { yes } => commands::down::handle(&load()?, &options, yes).await?,
        Commands::Outputs { show_secrets, json } => {
            commands::outputs::handle(&load()?, &options, show_secrets, json).await?
        }
        // Versionコマンドは設定ファイル不要
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
