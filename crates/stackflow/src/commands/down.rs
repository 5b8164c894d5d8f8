use crate::utils::{self, LoadedStack, RunOptions};
use colored::Colorize;
use stackflow_cloud::ActionType;

pub async fn handle(stack: &LoadedStack, options: &RunOptions, yes: bool) -> anyhow::Result<()> {
    println!("{}", "スタックを削除中...".yellow());
    utils::print_loaded_stack(stack);

    if !yes {
        println!();
        println!(
            "{}",
            "⚠ リソースを削除します。実行するには --yes を指定してください".yellow()
        );
        println!("  保護 (protected) およびインポート済みのリソースは削除されません。");
        return Ok(());
    }

    let engine = utils::build_engine(stack, options, true).await?;
    let report = engine.destroy(&stack.declaration).await?;
    utils::print_report(&report);

    let retained: Vec<_> = report
        .nodes
        .iter()
        .filter(|n| n.action == Some(ActionType::Retain))
        .map(|n| n.name.as_str())
        .collect();
    if !retained.is_empty() {
        println!();
        println!("保持したリソース: {}", retained.join(", ").cyan());
    }

    println!();
    if report.is_success() {
        println!("{}", "✓ 削除が完了しました".green().bold());
        Ok(())
    } else {
        eprintln!("{}", "✗ 一部のリソースの削除に失敗しました".red().bold());
        std::process::exit(1);
    }
}
