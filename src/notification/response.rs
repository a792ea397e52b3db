//! 发送结果 - 所有可预期的失败都以结构化响应返回，而不是错误

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::now_iso8601;

/// 队列在发送前被清空时的错误文本
pub const QUEUE_CLEARED_ERROR: &str = "queue cleared before sending";

/// 批量任务未给出结果就被丢弃时的错误文本
pub const DROPPED_ERROR: &str = "notification was dropped before a response was produced";

/// 后端 2xx 但声明失败且没有给出错误文本时使用
pub const BACKEND_REJECTED_ERROR: &str = "Failed to send notification: backend reported failure";

/// 响应自身的字段名，后端返回的同名字段不能进入 `extra`
const RESERVED_KEYS: [&str; 7] = [
    "success",
    "error",
    "rateLimited",
    "retryAfter",
    "batched",
    "batchSize",
    "timestamp",
];

/// 一次发送调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 被限流拒绝
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
    /// 建议的重试等待（秒，向上取整）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batched: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub timestamp: String,
    /// 后端返回的其他字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationResponse {
    /// 成功（无后端数据）
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            rate_limited: None,
            retry_after: None,
            batched: None,
            batch_size: None,
            timestamp: now_iso8601(),
            extra: Map::new(),
        }
    }

    /// 失败
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok()
        }
    }

    /// 被限流
    pub fn throttled(retry_after_secs: u64) -> Self {
        Self {
            rate_limited: Some(true),
            retry_after: Some(retry_after_secs),
            ..Self::failed(format!(
                "Rate limited: retry after {} second{}",
                retry_after_secs,
                if retry_after_secs == 1 { "" } else { "s" }
            ))
        }
    }

    /// 队列清空
    pub fn queue_cleared() -> Self {
        Self::failed(QUEUE_CLEARED_ERROR)
    }

    /// 合并 2xx 响应的 JSON body：`success` 默认 true，body 中类型正确的已知字段覆盖默认值，
    /// 类型错误的已知字段丢弃，其他字段原样保留到 `extra`。
    /// 后端声明失败却没有错误文本时补上 `BACKEND_REJECTED_ERROR`。
    pub fn from_backend(body: Map<String, Value>) -> Self {
        let mut response = Self::ok();

        for (key, value) in body {
            let handled = match (key.as_str(), &value) {
                ("success", Value::Bool(b)) => {
                    response.success = *b;
                    true
                }
                ("error", Value::String(s)) => {
                    response.error = Some(s.clone());
                    true
                }
                ("rateLimited", Value::Bool(b)) => {
                    response.rate_limited = Some(*b);
                    true
                }
                ("retryAfter", v) if v.as_u64().is_some() => {
                    response.retry_after = v.as_u64();
                    true
                }
                ("batched", Value::Bool(b)) => {
                    response.batched = Some(*b);
                    true
                }
                ("batchSize", v) if v.as_u64().is_some() => {
                    response.batch_size = v.as_u64().map(|n| n as usize);
                    true
                }
                ("timestamp", Value::String(s)) => {
                    response.timestamp = s.clone();
                    true
                }
                _ => false,
            };

            if !handled && !RESERVED_KEYS.contains(&key.as_str()) {
                response.extra.insert(key, value);
            }
        }

        if !response.success && response.error.as_deref().map_or(true, str::is_empty) {
            response.error = Some(BACKEND_REJECTED_ERROR.to_string());
        }

        response
    }

    /// 标记为批量发送结果（调用方设置的字段优先于后端返回）
    pub fn into_batched(mut self, batch_size: usize) -> Self {
        self.batched = Some(true);
        self.batch_size = Some(batch_size);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited.unwrap_or(false)
    }
}
