//! 通知发送层 - 限流、批量、超时保护的 HTTP 通知分发
//!
//! # 设计目标
//! 1. 不抛错：限流、HTTP 失败、超时、队列清空都以 `NotificationResponse` 返回
//! 2. 实例隔离：每个 `Notifier` 独占限流状态和批量队列
//! 3. 高优先级直达：`Priority::High` 跳过限流和批量
//! 4. 可替换发送层：`Notifier` 通过 `Transport` trait 发起请求
//!
//! # 使用示例
//! ```ignore
//! use notify_dispatch::notification::{self, NotificationOptions, Priority};
//!
//! // 模块级默认实例（配置来自环境变量）
//! let resp = notification::send("Build failed", NotificationOptions::new().with_priority(Priority::High)).await;
//! if !resp.success {
//!     eprintln!("notification not delivered: {:?}", resp.error);
//! }
//! ```

pub mod args;
pub mod batch;
pub mod config;
pub mod notifier;
pub mod payload;
pub mod priority;
pub mod rate_limit;
pub mod response;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use args::{ArgumentError, CallArgument, OPTION_ONLY_KEYS};
pub use batch::BatchQueue;
pub use config::{AmbientConfig, ConfigOverrides, EnvScope, NotifierConfig};
pub use notifier::Notifier;
pub use payload::{BatchPayload, NotificationOptions, NotificationPayload};
pub use priority::Priority;
pub use rate_limit::{should_throttle, RateLimiter, ThrottleDecision};
pub use response::NotificationResponse;
pub use transport::{DispatchError, Endpoint, HttpTransport, Transport, REQUEST_TIMEOUT};

use std::sync::OnceLock;

static DEFAULT_NOTIFIER: OnceLock<Notifier> = OnceLock::new();

/// 模块级默认实例，首次使用时从服务端环境变量解析配置
pub fn default_notifier() -> &'static Notifier {
    DEFAULT_NOTIFIER.get_or_init(|| Notifier::from_env(EnvScope::Server))
}

/// 通过默认实例发送
pub async fn send(message: impl Into<String>, options: NotificationOptions) -> NotificationResponse {
    default_notifier().send(message, options).await
}

/// 通过默认实例发送，显式参数只影响本次调用
pub async fn send_with_config(
    message: impl Into<String>,
    overrides: &ConfigOverrides,
    options: NotificationOptions,
) -> NotificationResponse {
    default_notifier()
        .send_with_config(message, overrides, options)
        .await
}

/// 清空默认实例的待发送队列
pub fn clear_pending_queue() -> usize {
    default_notifier().clear_pending_queue()
}
