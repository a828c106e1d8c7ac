use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use store_review_common::{RetryPolicy, SessionConfig};

/// サーバーURLを上書きする環境変数
pub const SERVER_ENV: &str = "STORE_REVIEW_SERVER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub operator: Option<String>,
    pub window_size: usize,
    pub completion_delay_ms: u64,
    pub image_max_retries: u32,
    pub image_retry_unit_ms: u64,
    pub overlay_path: Option<PathBuf>,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            operator: None,
            window_size: 10,
            completion_delay_ms: 500,
            image_max_retries: 3,
            image_retry_unit_ms: 1000,
            overlay_path: None,
            timeout_seconds: 30,
        }
    }
}

impl Config {
    /// 設定ファイルを読み込み、環境変数を反映する
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        if let Ok(server) = std::env::var(SERVER_ENV) {
            if !server.trim().is_empty() {
                config.server_url = server.trim().to_string();
            }
        }
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("store-review"))
    }

    /// 処理済みマークの保存先（未設定なら設定ディレクトリ内）
    pub fn overlay_file(&self) -> Result<PathBuf> {
        match &self.overlay_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("processed.json")),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            window_size: self.window_size.max(1),
            completion_delay: Duration::from_millis(self.completion_delay_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.image_max_retries,
            Duration::from_millis(self.image_retry_unit_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn set_server(&mut self, url: String) -> Result<()> {
        let url = url.trim().trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Config(format!("URLが不正です: {}", url)));
        }
        self.server_url = url;
        self.save()
    }

    pub fn set_operator(&mut self, operator: String) -> Result<()> {
        let operator = operator.trim().to_string();
        self.operator = if operator.is_empty() { None } else { Some(operator) };
        self.save()
    }
}
