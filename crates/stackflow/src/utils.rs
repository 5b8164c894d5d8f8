use crate::Backend;
use anyhow::Context;
use colored::Colorize;
use stackflow_cloud::{
    ActionType, Engine, MemoryBackend, NodeReport, Operator, ProviderContext, ResourceBackend,
    RetryConfig, RunReport, StateManager,
};
use stackflow_cloud_cloudflare::{CloudflareBackend, D1_DATABASE, R2_BUCKET};
use stackflow_config::{ACCOUNT_VARIABLE, CloudflareConfig, PROJECT_DIR};
use stackflow_core::{Declaration, ExportSet, NodeStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 読み込んだスタック定義
pub struct LoadedStack {
    pub declaration: Declaration,
    pub path: PathBuf,
    pub project_root: PathBuf,
}

/// 実行オプション
pub struct RunOptions {
    pub backend: Backend,
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// スタック定義を読み込み、変数の上書きを適用
pub fn load_stack(file: Option<&Path>, vars: &[String]) -> anyhow::Result<LoadedStack> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => stackflow_config::find_stack_file()?,
    };

    let mut declaration = Declaration::from_path(&path)
        .with_context(|| format!("スタック定義の読み込みに失敗しました: {}", path.display()))?;
    // 未宣言の accountId は CLOUDFLARE_ACCOUNT_ID から（--var が優先）
    if let Some(account_id) = CloudflareConfig::account_id_from_env() {
        declaration.default_variable(ACCOUNT_VARIABLE, serde_json::json!(account_id));
    }
    declaration
        .apply_overrides(vars)
        .context("変数の上書きに失敗しました")?;

    let project_root = stackflow_config::project_root(&path);
    Ok(LoadedStack {
        declaration,
        path,
        project_root,
    })
}

/// バックエンドと状態ファイルからエンジンを構築
///
/// `require_auth` の場合は認証情報を必須とし、事前に認証を確認する
pub async fn build_engine(
    stack: &LoadedStack,
    options: &RunOptions,
    require_auth: bool,
) -> anyhow::Result<Engine> {
    let retry = RetryConfig {
        max_attempts: options.max_attempts,
        ..RetryConfig::default()
    };

    let (backend, ctx, state): (Arc<dyn ResourceBackend>, ProviderContext, StateManager) =
        match options.backend {
            Backend::Cloudflare => {
                // plan / outputs はバックエンドを呼ばないので認証情報なしでも動く
                let ctx = match CloudflareConfig::from_env() {
                    Ok(config) => {
                        warn_account_mismatch(stack, &config.account_id);
                        ProviderContext::new()
                        .with_account(config.account_id)
                        .with_token(config.api_token)
                    }
                    Err(e) if require_auth => return Err(e.into()),
                    Err(_) => ProviderContext::new(),
                };
                (
                    Arc::new(CloudflareBackend::new()),
                    ctx,
                    StateManager::new(&stack.project_root),
                )
            }
            Backend::Memory => (
                Arc::new(memory_backend()),
                ProviderContext::new(),
                StateManager::in_dir(stack.project_root.join(PROJECT_DIR).join("memory")),
            ),
        };

    if require_auth {
        let auth = backend.check_auth(&ctx).await?;
        if !auth.authenticated {
            anyhow::bail!(
                "{} の認証に失敗しました: {}",
                backend.name(),
                auth.error.unwrap_or_default()
            );
        }
        tracing::debug!("Authenticated: {:?}", auth.account_info);
    }

    let operator = Operator::new(backend, ctx)
        .with_retry(retry)
        .with_timeout(options.timeout);
    Ok(Engine::new(operator, state))
}

/// accountId 変数が認証情報のアカウントと異なる場合に警告
fn warn_account_mismatch(stack: &LoadedStack, account_id: &str) {
    let mismatch = stack
        .declaration
        .variables
        .get(ACCOUNT_VARIABLE)
        .is_some_and(|declared| declared.as_str() != Some(account_id));
    if mismatch {
        tracing::warn!(
            "Variable {} does not match CLOUDFLARE_ACCOUNT_ID; exports may point at another account",
            ACCOUNT_VARIABLE
        );
    }
}

/// Cloudflare と同じ置き換え規則を持つメモリバックエンド
fn memory_backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_immutable_kind(R2_BUCKET)
        .with_replace_fields(D1_DATABASE, &["name", "primary_location_hint"])
}

/// 読み込んだ設定ファイル情報を表示
pub fn print_loaded_stack(stack: &LoadedStack) {
    println!("📄 スタック定義: {}", stack.path.display().to_string().cyan());
    println!(
        "   スタック: {} ({} リソース)",
        stack.declaration.name.cyan(),
        stack.declaration.resources.len()
    );
}

pub fn action_label(action: ActionType) -> colored::ColoredString {
    match action {
        ActionType::Create => "+ 作成".green(),
        ActionType::Import => "← インポート".cyan(),
        ActionType::Update => "~ 更新".yellow(),
        ActionType::Replace => "± 置き換え".yellow().bold(),
        ActionType::Delete => "- 削除".red(),
        ActionType::Blocked => "✗ 保護により拒否".red().bold(),
        ActionType::Retain => "= 保持".blue(),
        ActionType::Absent => "· 未作成".dimmed(),
        ActionType::NoOp => "= 変更なし".dimmed(),
    }
}

fn print_node(node: &NodeReport) {
    match node.status {
        NodeStatus::Applied => {
            let label = node
                .action
                .map(action_label)
                .unwrap_or_else(|| "✓".green());
            println!("  ✓ {} {}", node.name.cyan(), label);
        }
        NodeStatus::Failed => {
            println!("  ✗ {} {}", node.name.cyan(), "失敗".red().bold());
            if let Some(error) = &node.error {
                println!("      {}", error.red());
            }
        }
        NodeStatus::Skipped => {
            println!("  - {} {}", node.name.cyan(), "スキップ".yellow());
        }
        other => println!("  ? {} {}", node.name.cyan(), other),
    }
}

/// 実行結果を表示
pub fn print_report(report: &RunReport) {
    println!();
    println!("{}", "結果:".bold());
    for node in &report.nodes {
        print_node(node);
    }
    println!();
    println!("所要時間: {}ms", report.duration_ms);
}

/// 出力値を表示（シークレットは伏せ字）
pub fn print_exports(exports: &ExportSet, show_secrets: bool) {
    if exports.is_empty() {
        return;
    }

    println!();
    println!("{}", "出力:".bold());
    let redacted = exports.redacted();
    for (name, value, secret) in exports.iter() {
        let shown = if show_secrets { value } else { &redacted[name] };
        let text = match shown {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if secret {
            println!("  {} = {} {}", name.cyan(), text, "(secret)".dimmed());
        } else {
            println!("  {} = {}", name.cyan(), text);
        }
    }
}
