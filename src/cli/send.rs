// src/cli/send.rs
//! Send 命令 - 从命令行发送一条通知

use super::config::ConfigArgs;
use super::output::format_response;
use crate::notification::{CallArgument, NotificationOptions, NotificationResponse, Notifier, Priority};
use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::Value;
use tracing::debug;

/// Send 命令参数
#[derive(Args, Debug)]
pub struct SendArgs {
    /// 通知内容
    pub message: String,

    /// 优先级: low, medium, high
    #[arg(long, short)]
    pub priority: Option<Priority>,

    /// 分类
    #[arg(long, short)]
    pub category: Option<String>,

    /// 标签（可重复）
    #[arg(long = "tag", short)]
    pub tags: Vec<String>,

    /// 元数据 key=value（可重复，value 可以是 JSON）
    #[arg(long = "meta", short, value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,

    /// 本次调用走批量队列
    #[arg(long)]
    pub batch: bool,

    /// JSON 对象：含 priority/category/tags/metadata 时作为选项，否则作为配置
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,

    /// 紧凑 JSON 输出
    #[arg(long)]
    pub compact: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl SendArgs {
    /// 由命令行参数构造通知选项
    pub fn options(&self) -> Result<NotificationOptions> {
        let mut options = NotificationOptions::new();
        options.priority = self.priority;
        options.category = self.category.clone();
        for tag in &self.tags {
            options = options.with_tag(tag.clone());
        }
        for entry in &self.metadata {
            let (key, value) = parse_meta(entry)?;
            options = options.with_metadata(key, value);
        }
        if self.batch {
            options = options.with_batching(true);
        }
        Ok(options)
    }
}

/// 解析 `key=value`，value 优先按 JSON 解析
fn parse_meta(entry: &str) -> Result<(String, Value)> {
    let (key, raw) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid metadata entry (expected KEY=VALUE): {}", entry))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Metadata key is empty: {}", entry));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// 进程退出码：投递成功为 0，其余（限流、失败、队列清空）为 1
pub fn send_exit_status(response: &NotificationResponse) -> u8 {
    if response.success {
        0
    } else {
        1
    }
}

/// 处理 send 命令，返回发送结果
pub async fn handle_send(args: SendArgs) -> Result<NotificationResponse> {
    let config = args.config.resolve()?;
    let options = args.options()?;
    let argument = args
        .args
        .as_deref()
        .map(CallArgument::parse)
        .transpose()?;
    debug!(?config, has_args = argument.is_some(), "Sending notification");

    let notifier = Notifier::new(config);
    let response = notifier
        .send_dynamic(args.message.clone(), argument, Some(options))
        .await;

    println!("{}", format_response(&response, !args.compact));
    Ok(response)
}
