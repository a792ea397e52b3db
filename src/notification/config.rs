//! 配置解析 - 显式参数 > 环境变量 > 内置默认值
//!
//! 每个字段独立回退，解析结果在 `Notifier` 生命周期内不可变。
//!
//! 环境变量分两组：
//! 1. 服务端专用：`NOTIFY_API_KEY`、`NOTIFY_BACKEND_URL`、`NOTIFY_DEBUG`、`NOTIFY_THROTTLE_MS`、
//!    `NOTIFY_BATCHING`、`NOTIFY_BATCH_DELAY_MS`、`NOTIFY_ORIGIN`
//! 2. 前端可见：同名加 `PUBLIC_` 前缀
//!
//! `EnvScope::Public` 只读前缀组；`EnvScope::Server` 先读服务端组，再回退到前缀组。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::transport::Endpoint;

/// 默认后端地址（相对路径，需要 `origin` 才能在进程内解析）
pub const DEFAULT_BACKEND_URL: &str = "/api/notifications";

/// 默认限流窗口（毫秒）
pub const DEFAULT_THROTTLE_MS: u64 = 5000;

/// 默认批量延迟（毫秒）
pub const DEFAULT_BATCH_DELAY_MS: u64 = 2000;

/// 前端可见变量的前缀
pub const PUBLIC_ENV_PREFIX: &str = "PUBLIC_";

pub const ENV_API_KEY: &str = "NOTIFY_API_KEY";
pub const ENV_BACKEND_URL: &str = "NOTIFY_BACKEND_URL";
pub const ENV_DEBUG: &str = "NOTIFY_DEBUG";
pub const ENV_THROTTLE_MS: &str = "NOTIFY_THROTTLE_MS";
pub const ENV_BATCHING: &str = "NOTIFY_BATCHING";
pub const ENV_BATCH_DELAY_MS: &str = "NOTIFY_BATCH_DELAY_MS";
pub const ENV_ORIGIN: &str = "NOTIFY_ORIGIN";

/// 读取环境变量的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvScope {
    /// 前端可见上下文，只能读取 `PUBLIC_` 前缀变量
    Public,
    /// 服务端上下文
    Server,
}

/// 显式配置（调用方或 provider 传入），未设置的字段回退到环境变量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_throttle_ms(mut self, ms: u64) -> Self {
        self.throttle_ms = Some(ms);
        self
    }

    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = Some(enabled);
        self
    }

    pub fn with_batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = Some(ms);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// 逐字段合并，`self` 优先
    pub fn or(self, fallback: ConfigOverrides) -> Self {
        Self {
            api_key: self.api_key.or(fallback.api_key),
            backend_url: self.backend_url.or(fallback.backend_url),
            debug: self.debug.or(fallback.debug),
            throttle_ms: self.throttle_ms.or(fallback.throttle_ms),
            batching_enabled: self.batching_enabled.or(fallback.batching_enabled),
            batch_delay_ms: self.batch_delay_ms.or(fallback.batch_delay_ms),
            origin: self.origin.or(fallback.origin),
        }
    }

    /// 从 JSON 配置文件加载
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let overrides = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(overrides)
    }

    /// 默认配置文件路径 `~/.config/notify-dispatch/config.json`
    pub fn default_file_path() -> Option<std::path::PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/notify-dispatch/config.json"))
    }
}

/// 环境变量提供的配置，无效值视为未设置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmbientConfig {
    pub api_key: Option<String>,
    /// api key 是否来自前端可见变量
    pub api_key_is_public: bool,
    pub backend_url: Option<String>,
    pub debug: Option<bool>,
    pub throttle_ms: Option<u64>,
    pub batching_enabled: Option<bool>,
    pub batch_delay_ms: Option<u64>,
    pub origin: Option<String>,
}

impl AmbientConfig {
    /// 从进程环境变量读取
    pub fn from_env(scope: EnvScope) -> Self {
        Self::from_lookup(scope, |name| std::env::var(name).ok())
    }

    /// 通过查找函数读取（测试时不需要修改进程环境）
    pub fn from_lookup<F>(scope: EnvScope, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // 返回 (值, 是否来自前缀变量)
        let read = |name: &str| -> Option<(String, bool)> {
            let public = || {
                lookup(&format!("{PUBLIC_ENV_PREFIX}{name}"))
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (v, true))
            };
            match scope {
                EnvScope::Public => public(),
                EnvScope::Server => lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (v, false))
                    .or_else(public),
            }
        };
        let value = |name: &str| read(name).map(|(v, _)| v.trim().to_string());

        let api_key = read(ENV_API_KEY);

        Self {
            api_key_is_public: api_key.as_ref().is_some_and(|(_, public)| *public),
            api_key: api_key.map(|(v, _)| v.trim().to_string()),
            backend_url: value(ENV_BACKEND_URL),
            debug: value(ENV_DEBUG).and_then(|v| parse_flag(&v)),
            throttle_ms: value(ENV_THROTTLE_MS).and_then(|v| parse_positive(&v)),
            batching_enabled: value(ENV_BATCHING).and_then(|v| parse_flag(&v)),
            batch_delay_ms: value(ENV_BATCH_DELAY_MS).and_then(|v| parse_positive(&v)),
            origin: value(ENV_ORIGIN),
        }
    }
}

/// 宽松解析布尔值
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// 解析正整数，0 和无法解析的值视为未设置
fn parse_positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

/// 生效的 api key 是否来自前端可见变量（显式 key 优先时不算）
fn api_key_from_public_env(overrides: &ConfigOverrides, ambient: &AmbientConfig) -> bool {
    let has_explicit_key = overrides.api_key.as_deref().is_some_and(|k| !k.is_empty());
    !has_explicit_key && ambient.api_key_is_public && ambient.api_key.is_some()
}

/// 解析后的完整配置
#[derive(Clone, PartialEq)]
pub struct NotifierConfig {
    pub api_key: Option<String>,
    pub backend_url: String,
    pub debug: bool,
    pub throttle_ms: u64,
    pub batching_enabled: bool,
    pub batch_delay_ms: u64,
    /// 解析相对 `backend_url` 的基础地址
    pub origin: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            debug: false,
            throttle_ms: DEFAULT_THROTTLE_MS,
            batching_enabled: false,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            origin: None,
        }
    }
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("api_key", &self.masked_api_key())
            .field("backend_url", &self.backend_url)
            .field("debug", &self.debug)
            .field("throttle_ms", &self.throttle_ms)
            .field("batching_enabled", &self.batching_enabled)
            .field("batch_delay_ms", &self.batch_delay_ms)
            .field("origin", &self.origin)
            .finish()
    }
}

impl NotifierConfig {
    /// 按 显式 > 环境 > 默认 逐字段解析
    pub fn resolve(overrides: &ConfigOverrides, ambient: &AmbientConfig) -> Self {
        let defaults = Self::default();
        let explicit_key = overrides.api_key.clone().filter(|k| !k.is_empty());

        let config = Self {
            api_key: explicit_key.or_else(|| ambient.api_key.clone()),
            backend_url: overrides
                .backend_url
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| ambient.backend_url.clone())
                .unwrap_or(defaults.backend_url),
            debug: overrides.debug.or(ambient.debug).unwrap_or(defaults.debug),
            throttle_ms: overrides
                .throttle_ms
                .filter(|v| *v > 0)
                .or(ambient.throttle_ms)
                .unwrap_or(defaults.throttle_ms),
            batching_enabled: overrides
                .batching_enabled
                .or(ambient.batching_enabled)
                .unwrap_or(defaults.batching_enabled),
            batch_delay_ms: overrides
                .batch_delay_ms
                .filter(|v| *v > 0)
                .or(ambient.batch_delay_ms)
                .unwrap_or(defaults.batch_delay_ms),
            origin: overrides
                .origin
                .clone()
                .filter(|o| !o.is_empty())
                .or_else(|| ambient.origin.clone()),
        };

        if config.debug {
            info!(
                has_api_key = config.api_key.is_some(),
                default_backend_url = config.is_default_backend(),
                backend_url = %config.backend_url,
                "Notification config resolved"
            );
            if api_key_from_public_env(overrides, ambient) {
                warn!(
                    var = %format!("{PUBLIC_ENV_PREFIX}{ENV_API_KEY}"),
                    "API key comes from a browser-exposed variable; it is visible to clients"
                );
            }
        }

        config
    }

    /// 仅使用环境变量和默认值
    pub fn from_env(scope: EnvScope) -> Self {
        Self::resolve(&ConfigOverrides::default(), &AmbientConfig::from_env(scope))
    }

    /// 以当前配置为底，叠加显式参数，返回新配置（不修改自身）
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let ambient = AmbientConfig {
            api_key: self.api_key.clone(),
            api_key_is_public: false,
            backend_url: Some(self.backend_url.clone()),
            debug: Some(self.debug),
            throttle_ms: Some(self.throttle_ms),
            batching_enabled: Some(self.batching_enabled),
            batch_delay_ms: Some(self.batch_delay_ms),
            origin: self.origin.clone(),
        };
        Self::resolve(overrides, &ambient)
    }

    pub fn is_default_backend(&self) -> bool {
        self.backend_url == DEFAULT_BACKEND_URL
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// 发送目标（批量分组的键）
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            backend_url: self.backend_url.clone(),
            api_key: self.api_key.clone(),
            origin: self.origin.clone(),
        }
    }

    /// 脱敏后的 api key：只保留末 4 位
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            if chars.len() <= 4 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{tail}")
            }
        })
    }

    /// 用于展示的 JSON（api key 脱敏）
    pub fn to_masked_json(&self) -> serde_json::Value {
        serde_json::json!({
            "apiKey": self.masked_api_key(),
            "backendUrl": self.backend_url,
            "debug": self.debug,
            "throttleMs": self.throttle_ms,
            "batchingEnabled": self.batching_enabled,
            "batchDelayMs": self.batch_delay_ms,
            "origin": self.origin,
        })
    }
}
