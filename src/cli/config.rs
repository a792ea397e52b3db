//! Config 命令与共享的配置参数
//!
//! 优先级：命令行参数 > 配置文件 > 环境变量 > 默认值

use crate::notification::{AmbientConfig, ConfigOverrides, EnvScope, NotifierConfig};
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

/// 所有命令共享的配置参数
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON 配置文件（默认 ~/.config/notify-dispatch/config.json，存在时加载）
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bearer token
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// 后端地址
    #[arg(long, value_name = "URL")]
    pub backend_url: Option<String>,

    /// 解析相对后端地址的基础 URL
    #[arg(long, value_name = "URL")]
    pub origin: Option<String>,

    /// 输出调试诊断
    #[arg(long)]
    pub debug: bool,

    /// 限流窗口（毫秒）
    #[arg(long, value_name = "MS")]
    pub throttle_ms: Option<u64>,

    /// 开启批量发送
    #[arg(long)]
    pub batching: bool,

    /// 批量延迟（毫秒）
    #[arg(long, value_name = "MS")]
    pub batch_delay_ms: Option<u64>,

    /// 只读取 PUBLIC_ 前缀的环境变量
    #[arg(long)]
    pub public_env: bool,
}

impl ConfigArgs {
    /// 命令行参数覆盖配置文件
    pub fn overrides(&self) -> Result<ConfigOverrides> {
        let flags = ConfigOverrides {
            api_key: self.api_key.clone(),
            backend_url: self.backend_url.clone(),
            debug: self.debug.then_some(true),
            throttle_ms: self.throttle_ms,
            batching_enabled: self.batching.then_some(true),
            batch_delay_ms: self.batch_delay_ms,
            origin: self.origin.clone(),
        };

        let file = match &self.config {
            Some(path) => {
                if !path.exists() {
                    return Err(anyhow!("Config file not found: {}", path.display()));
                }
                ConfigOverrides::from_file(path)?
            }
            None => match ConfigOverrides::default_file_path().filter(|p| p.exists()) {
                Some(path) => {
                    debug!(path = %path.display(), "Loading default config file");
                    ConfigOverrides::from_file(&path)?
                }
                None => ConfigOverrides::default(),
            },
        };

        Ok(flags.or(file))
    }

    pub fn env_scope(&self) -> EnvScope {
        if self.public_env {
            EnvScope::Public
        } else {
            EnvScope::Server
        }
    }

    /// 解析完整配置
    pub fn resolve(&self) -> Result<NotifierConfig> {
        let overrides = self.overrides()?;
        Ok(NotifierConfig::resolve(
            &overrides,
            &AmbientConfig::from_env(self.env_scope()),
        ))
    }
}

/// 处理 config 命令：打印解析后的配置（api key 脱敏）
pub fn handle_config(args: ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    println!("{}", serde_json::to_string_pretty(&config.to_masked_json())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"apiKey":"file-key","throttleMs":1000}"#).unwrap();

        let args = ConfigArgs {
            config: Some(path),
            api_key: Some("flag-key".to_string()),
            batching: true,
            ..Default::default()
        };
        let overrides = args.overrides().unwrap();

        assert_eq!(overrides.api_key.as_deref(), Some("flag-key"));
        assert_eq!(overrides.throttle_ms, Some(1000));
        assert_eq!(overrides.batching_enabled, Some(true));
        assert_eq!(overrides.debug, None);
    }

    #[test]
    fn test_missing_explicit_config_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            config: Some(dir.path().join("nope.json")),
            ..Default::default()
        };
        assert!(args.overrides().is_err());
    }

    #[test]
    fn test_env_scope_flag() {
        assert_eq!(ConfigArgs::default().env_scope(), EnvScope::Server);
        let args = ConfigArgs {
            public_env: true,
            ..Default::default()
        };
        assert_eq!(args.env_scope(), EnvScope::Public);
    }
}
