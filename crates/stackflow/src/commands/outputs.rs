use crate::utils::{self, LoadedStack, RunOptions};

pub async fn handle(
    stack: &LoadedStack,
    options: &RunOptions,
    show_secrets: bool,
    json: bool,
) -> anyhow::Result<()> {
    // 状態ファイルのみを参照（バックエンドは呼び出さない）
    let engine = utils::build_engine(stack, options, false).await?;
    let exports = engine.outputs(&stack.declaration).await?;

    if json {
        let values = if show_secrets {
            exports
                .iter()
                .map(|(name, value, _)| (name.to_string(), value.clone()))
                .collect()
        } else {
            exports.redacted()
        };
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        utils::print_exports(&exports, show_secrets);
    }

    Ok(())
}
