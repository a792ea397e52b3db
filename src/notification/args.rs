//! 动态调用参数 - 单个 JSON 对象既可能是配置也可能是通知选项
//!
//! 包含任一选项专属字段（`priority`、`category`、`tags`、`metadata`）即视为选项，
//! 否则视为配置。未知字段忽略。

use serde_json::Value;

use super::config::ConfigOverrides;
use super::notifier::Notifier;
use super::payload::NotificationOptions;
use super::response::NotificationResponse;

/// 只在通知选项中出现的字段
pub const OPTION_ONLY_KEYS: [&str; 4] = ["priority", "category", "tags", "metadata"];

/// 参数解析错误
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("call argument must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid call argument: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// 区分后的调用参数
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgument {
    Config(ConfigOverrides),
    Options(NotificationOptions),
}

impl CallArgument {
    /// 根据字段判断参数类型
    pub fn classify(value: Value) -> Result<Self, ArgumentError> {
        let is_options = match &value {
            Value::Object(map) => OPTION_ONLY_KEYS.iter().any(|key| map.contains_key(*key)),
            other => return Err(ArgumentError::NotAnObject(json_type_name(other))),
        };

        if is_options {
            Ok(CallArgument::Options(serde_json::from_value(value)?))
        } else {
            Ok(CallArgument::Config(serde_json::from_value(value)?))
        }
    }

    /// 解析 JSON 字符串
    pub fn parse(raw: &str) -> Result<Self, ArgumentError> {
        Self::classify(serde_json::from_str(raw)?)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Notifier {
    /// 重载形式的发送：`argument` 为配置时与 `options` 一起使用；
    /// 为选项时直接作为本次选项，`options` 被忽略
    pub async fn send_dynamic(
        &self,
        message: impl Into<String>,
        argument: Option<CallArgument>,
        options: Option<NotificationOptions>,
    ) -> NotificationResponse {
        match argument {
            Some(CallArgument::Config(overrides)) => {
                self.send_with_config(message, &overrides, options.unwrap_or_default())
                    .await
            }
            Some(CallArgument::Options(call_options)) => self.send(message, call_options).await,
            None => self.send(message, options.unwrap_or_default()).await,
        }
    }
}
