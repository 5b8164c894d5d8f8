use crate::utils::{self, LoadedStack, RunOptions};
use colored::Colorize;

pub async fn handle(stack: &LoadedStack, options: &RunOptions) -> anyhow::Result<()> {
    println!("{}", "変更内容を計算中...".blue());
    utils::print_loaded_stack(stack);

    let engine = utils::build_engine(stack, options, false).await?;
    let plan = engine.plan(&stack.declaration).await?;

    println!();
    for action in &plan.actions {
        let mut line = format!(
            "  {} {} ({})",
            utils::action_label(action.action_type),
            action.resource.cyan(),
            action.kind
        );
        if !action.fields.is_empty() {
            line.push_str(&format!(" [{}]", action.fields.join(", ")));
        }
        if action.pending_inputs {
            line.push_str(&format!(" {}", "(適用後に確定する入力あり)".dimmed()));
        }
        println!("{}", line);
    }

    println!();
    if plan.has_changes {
        println!("{}", plan.summary().to_string().bold());
    } else {
        println!("{}", "✓ 変更はありません".green());
    }

    Ok(())
}
