use crate::utils::{self, LoadedStack, RunOptions};
use crate::Backend;
use colored::Colorize;

pub async fn handle(stack: &LoadedStack, options: &RunOptions, show_secrets: bool) -> anyhow::Result<()> {
    println!("{}", "スタックを適用中...".green());
    utils::print_loaded_stack(stack);

    if options.backend == Backend::Memory {
        println!("{}", "ℹ メモリバックエンドで実行します（実リソースは作成されません）".yellow());
    }

    let engine = utils::build_engine(stack, options, true).await?;
    let report = engine.apply(&stack.declaration).await?;

    utils::print_report(&report);
    if let Some(exports) = &report.exports {
        utils::print_exports(exports, show_secrets);
    }
    if let Some(error) = &report.export_error {
        println!();
        println!("{}", "⚠ 出力値を確定できませんでした".yellow());
        println!("  {}", error);
    }

    println!();
    if report.is_success() {
        println!("{}", "✓ 適用が完了しました！".green().bold());
        Ok(())
    } else {
        eprintln!("{}", "✗ 一部のリソースの適用に失敗しました".red().bold());
        eprintln!("  完了したリソースは状態ファイルに記録されています。再実行すると残りを適用します。");
        std::process::exit(1);
    }
}
