use crate::utils::{self, LoadedStack};
use colored::Colorize;
use stackflow_core::DependencyGraph;

pub fn handle(stack: &LoadedStack) -> anyhow::Result<()> {
    println!("{}", "スタック定義を検証中...".blue());
    utils::print_loaded_stack(stack);

    let declaration = &stack.declaration;
    let checked = declaration
        .validate()
        .and_then(|_| DependencyGraph::build(&declaration.resources))
        .and_then(|graph| graph.schedule());

    let schedule = match checked {
        Ok(schedule) => schedule,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 定義エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ スタック定義は正常です！".green().bold());
    println!();
    println!("適用順 ({} レイヤー):", schedule.len());
    for (index, layer) in schedule.layers().iter().enumerate() {
        let names: Vec<_> = layer.iter().map(|name| name.cyan().to_string()).collect();
        println!("  {}. {}", index + 1, names.join(", "));
    }

    println!();
    println!("サマリー:");
    println!("  リソース: {}個", declaration.resources.len());
    for resource in &declaration.resources {
        println!(
            "    - {} ({}, {})",
            resource.name.cyan(),
            resource.kind,
            resource.policy
        );
    }
    println!("  派生値: {}個", declaration.derived.len());
    println!("  出力: {}個", declaration.exports.len());

    Ok(())
}
