use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 令牌和用户缓存的持久化文件, 为空时只保存在内存中
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// PO 号输入防抖间隔 (毫秒)
    pub po_lookup_debounce_ms: u64,
}

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const ENV_PREFIX: &str = "RECONCILE";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            session: SessionConfig::default(),
            review: ReviewConfig {
                po_lookup_debounce_ms: DEFAULT_DEBOUNCE_MS,
            },
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ReviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.po_lookup_debounce_ms)
    }
}

impl AppConfig {
    /// 加载配置: 默认值 -> 配置文件 (可选) -> 环境变量
    ///
    /// 环境变量使用 `RECONCILE__` 前缀, 层级用 `__` 分隔, 例如 `RECONCILE__API__BASE_URL`。
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            .set_default("api.timeout_secs", DEFAULT_TIMEOUT_SECS)?
            .set_default("review.po_lookup_debounce_ms", DEFAULT_DEBOUNCE_MS)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// 只从环境变量加载配置
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }
}
