use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "スタック定義ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: stack.local.yaml, .stack.local.yaml, stack.yaml, .stack.yaml\n\
        - ./.stackflow/ ディレクトリ\n\
        - ~/.config/stackflow/stack.yaml\n\
        または STACK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound,

    #[error("環境変数 {0} が設定されていません")]
    MissingEnvVar(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
