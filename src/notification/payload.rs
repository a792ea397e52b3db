//! Payload 模块 - 通知选项与线上 payload
//!
//! 单条通知的 JSON 格式：
//! ```json
//! {
//!   "message": "Build finished",
//!   "priority": "high",
//!   "category": "ci",
//!   "tags": ["deploy"],
//!   "metadata": { "run": 42 },
//!   "timestamp": "2026-02-08T00:00:00.000Z"
//! }
//! ```
//!
//! 批量请求的 JSON 格式：
//! ```json
//! { "notifications": [ ... ], "timestamp": "...", "batchSize": 2 }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::priority::Priority;

/// 当前时间的 ISO-8601 字符串（毫秒精度，UTC）
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 调用方提供的通知选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    /// 优先级（未设置时按 medium 处理，但不会写入 payload）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// 分类
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// 标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// 任意元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// 单次调用开启批量发送（与全局配置取或）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching_enabled: Option<bool>,
}

impl NotificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 设置分类
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// 追加一个标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(Vec::new).push(tag.into());
        self
    }

    /// 追加一项元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// 设置单次批量开关
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = Some(enabled);
        self
    }

    /// 生效的优先级
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    pub fn is_high_priority(&self) -> bool {
        self.effective_priority().bypasses_scheduling()
    }
}

/// 单条通知的线上 payload，调用时构造，之后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// 调用时刻，而非发送时刻
    pub timestamp: String,
}

impl NotificationPayload {
    /// 从消息和选项构造 payload（`batching_enabled` 不上线）
    pub fn new(message: impl Into<String>, options: &NotificationOptions) -> Self {
        Self {
            message: message.into(),
            priority: options.priority,
            category: options.category.clone(),
            tags: options.tags.clone(),
            metadata: options.metadata.clone(),
            timestamp: now_iso8601(),
        }
    }
}

/// 批量请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub notifications: Vec<NotificationPayload>,
    pub timestamp: String,
    pub batch_size: usize,
}

impl BatchPayload {
    /// 按插入顺序组装批量请求
    pub fn new(notifications: Vec<NotificationPayload>) -> Self {
        let batch_size = notifications.len();
        Self {
            notifications,
            timestamp: now_iso8601(),
            batch_size,
        }
    }
}
