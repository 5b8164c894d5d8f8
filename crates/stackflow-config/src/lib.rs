pub mod error;

pub use error::*;

use std::fmt;
use std::path::{Path, PathBuf};

/// プロジェクト内の設定ディレクトリ名
pub const PROJECT_DIR: &str = ".stackflow";

/// Cloudflare アカウントIDを受け取るスタック変数名
pub const ACCOUNT_VARIABLE: &str = "accountId";

const CANDIDATES: [&str; 4] = [
    "stack.local.yaml",
    ".stack.local.yaml",
    "stack.yaml",
    ".stack.yaml",
];

/// StackFlowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのスタック定義ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 STACK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.yaml, .stack.local.yaml, stack.yaml, .stack.yaml
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/stack.yaml (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("STACK_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("STACK_CONFIG_PATH {} does not exist", path.display());
    }

    // 2, 3. カレントディレクトリと ./.stackflow/
    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_stack_file_in(&current_dir) {
        return Ok(path);
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackflow").join("stack.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// 指定ディレクトリとその .stackflow/ からスタック定義ファイルを探す
pub fn find_stack_file_in(dir: &Path) -> Option<PathBuf> {
    let search = |base: &Path| {
        CANDIDATES
            .iter()
            .map(|name| base.join(name))
            .find(|path| path.is_file())
    };

    search(dir).or_else(|| {
        let project_dir = dir.join(PROJECT_DIR);
        if project_dir.is_dir() {
            search(&project_dir)
        } else {
            None
        }
    })
}

/// スタック定義ファイルに対応するプロジェクトルート
///
/// `.stackflow/` 内のファイルならその親ディレクトリ
pub fn project_root(stack_file: &Path) -> PathBuf {
    let dir = stack_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if dir.file_name().is_some_and(|name| name == PROJECT_DIR) {
        dir.parent().map(Path::to_path_buf).unwrap_or(dir)
    } else {
        dir
    }
}

/// Cloudflare の認証情報
#[derive(Clone)]
pub struct CloudflareConfig {
    pub account_id: String,
    pub api_token: String,
}

impl CloudflareConfig {
    /// 環境変数 CLOUDFLARE_ACCOUNT_ID / CLOUDFLARE_API_TOKEN から読み込む
    pub fn from_env() -> Result<Self> {
        let account_id = std::env::var("CLOUDFLARE_ACCOUNT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("CLOUDFLARE_ACCOUNT_ID".to_string()))?;
        let api_token = std::env::var("CLOUDFLARE_API_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("CLOUDFLARE_API_TOKEN".to_string()))?;

        Ok(Self {
            account_id,
            api_token,
        })
    }

    /// 環境変数 CLOUDFLARE_ACCOUNT_ID のみを読む（トークン不要）
    pub fn account_id_from_env() -> Option<String> {
        std::env::var("CLOUDFLARE_ACCOUNT_ID")
            .ok()
            .filter(|id| !id.is_empty())
    }
}

impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("account_id", &self.account_id)
            .field("api_token", &"[secret]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let result = get_config_dir();
        assert!(result.is_ok());

        let config_dir = result.unwrap();
        assert!(config_dir.ends_with("stackflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.yaml"), "name: test").unwrap();

        // テンポラリディレクトリに移動
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset("STACK_CONFIG_PATH", find_stack_file);
        assert!(result.unwrap().ends_with("stack.yaml"));

        // 元のディレクトリに戻る
        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_local_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.yaml"), "name: shared").unwrap();
        fs::write(temp_dir.path().join("stack.local.yaml"), "name: local").unwrap();

        // stack.local.yaml が優先される
        let result = find_stack_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with("stack.local.yaml"));
    }

    #[test]
    fn test_hidden_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".stack.local.yaml"), "name: hidden").unwrap();
        fs::write(temp_dir.path().join("stack.yaml"), "name: visible").unwrap();

        let result = find_stack_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with(".stack.local.yaml"));
    }

    #[test]
    fn test_find_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("stack.yaml"), "name: nested").unwrap();

        let result = find_stack_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with(".stackflow/stack.yaml"));
        assert_eq!(project_root(&result), temp_dir.path());
    }

    #[test]
    fn test_nothing_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(find_stack_file_in(temp_dir.path()).is_none());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "name: custom").unwrap();

        let result = temp_env::with_var("STACK_CONFIG_PATH", Some(&config_path), find_stack_file);
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_project_root() {
        assert_eq!(
            project_root(Path::new("/work/app/stack.yaml")),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            project_root(Path::new("/work/app/.stackflow/stack.yaml")),
            PathBuf::from("/work/app")
        );
    }

    #[test]
    #[serial]
    fn test_cloudflare_config_from_env() {
        temp_env::with_vars(
            [
                ("CLOUDFLARE_ACCOUNT_ID", Some("acct-1")),
                ("CLOUDFLARE_API_TOKEN", Some("super-secret")),
            ],
            || {
                let config = CloudflareConfig::from_env().unwrap();
                assert_eq!(config.account_id, "acct-1");
                assert!(!format!("{:?}", config).contains("super-secret"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_account_id_from_env() {
        temp_env::with_var("CLOUDFLARE_ACCOUNT_ID", Some("acct-1"), || {
            assert_eq!(CloudflareConfig::account_id_from_env().as_deref(), Some("acct-1"));
        });
        temp_env::with_var("CLOUDFLARE_ACCOUNT_ID", Some(""), || {
            assert!(CloudflareConfig::account_id_from_env().is_none());
        });
    }

    #[test]
    #[serial]
    fn test_cloudflare_config_missing_token() {
        temp_env::with_vars(
            [
                ("CLOUDFLARE_ACCOUNT_ID", Some("acct-1")),
                ("CLOUDFLARE_API_TOKEN", None),
            ],
            || match CloudflareConfig::from_env() {
                Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, "CLOUDFLARE_API_TOKEN"),
                other => panic!("Expected MissingEnvVar, got {:?}", other),
            },
        );
    }
}
