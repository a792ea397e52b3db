//! 通知入口 - 串联 配置 → 优先级 → 限流 → 入队或直接发送
//!
//! 每个 `Notifier` 独占自己的限流状态和批量队列，实例之间互不影响。
//! 持有 `Notifier` 就是发送通知的能力；drop 时自动清空待发送队列。
//!
//! # 使用示例
//! ```ignore
//! use notify_dispatch::notification::{Notifier, NotifierConfig, NotificationOptions, Priority};
//!
//! let notifier = Notifier::new(NotifierConfig::default());
//! let resp = notifier
//!     .send("Deploy finished", NotificationOptions::new().with_priority(Priority::High))
//!     .await;
//! assert!(resp.success);
//! ```

use std::sync::Arc;
use tracing::warn;

use super::batch::BatchQueue;
use super::config::{ConfigOverrides, EnvScope, NotifierConfig};
use super::payload::{NotificationOptions, NotificationPayload};
use super::rate_limit::{RateLimiter, ThrottleDecision};
use super::response::{NotificationResponse, DROPPED_ERROR};
use super::transport::{HttpTransport, Transport};

/// 通知入口
pub struct Notifier {
    config: NotifierConfig,
    limiter: RateLimiter,
    queue: Arc<BatchQueue>,
    transport: Arc<dyn Transport>,
}

impl Notifier {
    /// 使用 HTTP 发送层
    pub fn new(config: NotifierConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// 使用自定义发送层
    pub fn with_transport(config: NotifierConfig, transport: Arc<dyn Transport>) -> Self {
        let queue = BatchQueue::new(transport.clone(), config.batch_delay(), config.debug);
        Self {
            config,
            limiter: RateLimiter::new(),
            queue,
            transport,
        }
    }

    /// 配置只来自环境变量和默认值
    pub fn from_env(scope: EnvScope) -> Self {
        Self::new(NotifierConfig::from_env(scope))
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// 发送通知，使用实例配置
    pub async fn send(
        &self,
        message: impl Into<String>,
        options: NotificationOptions,
    ) -> NotificationResponse {
        self.dispatch(&self.config, message.into(), options).await
    }

    /// 发送通知，显式参数叠加在实例配置之上（只影响本次调用）
    pub async fn send_with_config(
        &self,
        message: impl Into<String>,
        overrides: &ConfigOverrides,
        options: NotificationOptions,
    ) -> NotificationResponse {
        let config = self.config.with_overrides(overrides);
        self.dispatch(&config, message.into(), options).await
    }

    async fn dispatch(
        &self,
        config: &NotifierConfig,
        message: String,
        options: NotificationOptions,
    ) -> NotificationResponse {
        let payload = NotificationPayload::new(message, &options);
        let is_high_priority = options.is_high_priority();

        if !is_high_priority {
            if let ThrottleDecision::Throttled { retry_after_secs } =
                self.limiter.check(config.throttle_window(), false)
            {
                if config.debug {
                    warn!(retry_after_secs, "Notification throttled");
                }
                return NotificationResponse::throttled(retry_after_secs);
            }
        }

        let batching = config.batching_enabled || options.batching_enabled.unwrap_or(false);
        if batching && !is_high_priority {
            let receiver = self.queue.enqueue(payload, config.endpoint());
            return match receiver.await {
                Ok(response) => response,
                Err(_) => {
                    if config.debug {
                        warn!("Batch worker dropped a queued notification without a response");
                    }
                    NotificationResponse::failed(DROPPED_ERROR)
                }
            };
        }

        let response = self
            .transport
            .send_one(&payload, &config.endpoint(), config.debug)
            .await;
        // 失败也计入限流窗口，避免快速失败重试
        self.limiter.record_send();
        response
    }

    /// 立即发送批量队列中的通知
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// 清空待发送队列，所有等待中的调用得到失败结果，返回清除数量
    pub fn clear_pending_queue(&self) -> usize {
        self.queue.shutdown()
    }

    /// 待发送数量
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.queue.shutdown();
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .field("transport", &self.transport.name())
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::config::AmbientConfig;
    use crate::notification::mock::RecordingTransport;
    use crate::notification::priority::Priority;
    use crate::notification::response::QUEUE_CLEARED_ERROR;
    use std::time::Duration;

    fn config(overrides: ConfigOverrides) -> NotifierConfig {
        NotifierConfig::resolve(
            &overrides.with_backend_url("https://hooks.example.com/notify"),
            &AmbientConfig::default(),
        )
    }

    fn notifier(overrides: ConfigOverrides) -> (Notifier, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        (Notifier::with_transport(config(overrides), transport.clone()), transport)
    }

    fn high() -> NotificationOptions {
        NotificationOptions::new().with_priority(Priority::High)
    }

    #[tokio::test]
    async fn test_first_send_goes_out_solo() {
        let (notifier, transport) = notifier(ConfigOverrides::new());

        let resp = notifier.send("hello", NotificationOptions::default()).await;

        assert!(resp.success);
        assert_eq!(transport.single_calls(), 1);
        assert_eq!(transport.singles()[0].message, "hello");
    }

    #[tokio::test]
    async fn test_second_send_inside_window_is_throttled_without_io() {
        let (notifier, transport) = notifier(ConfigOverrides::new().with_throttle_ms(60_000));

        assert!(notifier.send("a", NotificationOptions::default()).await.success);
        let resp = notifier.send("b", NotificationOptions::default()).await;

        assert!(!resp.success);
        assert!(resp.is_rate_limited());
        assert_eq!(resp.retry_after, Some(60));
        assert_eq!(transport.single_calls(), 1);
        assert_eq!(transport.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_after_window_proceeds() {
        let (notifier, transport) = notifier(ConfigOverrides::new().with_throttle_ms(50));

        notifier.send("a", NotificationOptions::default()).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let resp = notifier.send("b", NotificationOptions::default()).await;

        assert!(resp.success);
        assert_eq!(transport.single_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_still_counts_toward_window() {
        let transport = Arc::new(RecordingTransport::failing("Failed to send notification: boom"));
        let notifier = Notifier::with_transport(
            config(ConfigOverrides::new().with_throttle_ms(60_000)),
            transport.clone(),
        );

        let first = notifier.send("a", NotificationOptions::default()).await;
        assert!(!first.success);
        assert!(!first.is_rate_limited());

        let second = notifier.send("b", NotificationOptions::default()).await;
        assert!(second.is_rate_limited());
        assert_eq!(transport.single_calls(), 1);
    }

    #[tokio::test]
    async fn test_high_priority_bypasses_throttle_and_batching() {
        let (notifier, transport) = notifier(
            ConfigOverrides::new()
                .with_throttle_ms(60_000)
                .with_batching(true)
                .with_batch_delay_ms(60_000),
        );

        // 先制造一次单独发送，使窗口关闭
        assert!(notifier.send("urgent-1", high()).await.success);
        let resp = notifier.send("urgent-2", high()).await;

        assert!(resp.success);
        assert_eq!(resp.batched, None);
        assert_eq!(transport.single_calls(), 2);
        assert_eq!(notifier.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_batching_groups_calls() {
        let (notifier, transport) = notifier(
            ConfigOverrides::new().with_batching(true).with_batch_delay_ms(50),
        );

        let (a, b) = tokio::join!(
            notifier.send("a", NotificationOptions::default()),
            notifier.send("b", NotificationOptions::default()),
        );

        assert_eq!(transport.batch_calls(), 1);
        assert_eq!(transport.single_calls(), 0);
        for resp in [a, b] {
            assert!(resp.success);
            assert_eq!(resp.batched, Some(true));
            assert_eq!(resp.batch_size, Some(2));
        }
    }

    #[tokio::test]
    async fn test_per_call_batching_flag() {
        let (notifier, transport) = notifier(ConfigOverrides::new().with_batch_delay_ms(20));

        let resp = notifier
            .send("a", NotificationOptions::new().with_batching(true))
            .await;

        assert_eq!(resp.batched, Some(true));
        assert_eq!(transport.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_batched_sends_do_not_update_limiter() {
        let (notifier, transport) = notifier(
            ConfigOverrides::new()
                .with_throttle_ms(60_000)
                .with_batching(true)
                .with_batch_delay_ms(20),
        );

        notifier.send("a", NotificationOptions::default()).await;
        let resp = notifier.send("b", NotificationOptions::default()).await;

        assert!(resp.success);
        assert!(!resp.is_rate_limited());
        assert_eq!(transport.batch_calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_pending_queue_resolves_waiters() {
        let (notifier, transport) = notifier(
            ConfigOverrides::new().with_batching(true).with_batch_delay_ms(60_000),
        );
        let notifier = Arc::new(notifier);

        let waiters: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|message| {
                let notifier = notifier.clone();
                tokio::spawn(async move { notifier.send(message, NotificationOptions::default()).await })
            })
            .collect();

        while notifier.pending_count() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(notifier.clear_pending_queue(), 2);

        for waiter in waiters {
            let resp = waiter.await.unwrap();
            assert!(!resp.success);
            assert!(resp.error.unwrap().contains("cleared"));
        }

        notifier.flush().await;
        assert_eq!(transport.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_with_config_overrides_endpoint_for_one_call() {
        let (notifier, transport) = notifier(ConfigOverrides::new());

        notifier
            .send_with_config(
                "a",
                &ConfigOverrides::new().with_api_key("call-key"),
                high(),
            )
            .await;
        notifier.send("b", high()).await;

        let endpoints = transport.single_endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].api_key.as_deref(), Some("call-key"));
        assert_eq!(endpoints[1].api_key, None);
        assert_eq!(notifier.config().api_key, None);
    }

    #[tokio::test]
    async fn test_instances_do_not_share_state() {
        let (first, first_transport) = notifier(ConfigOverrides::new().with_throttle_ms(60_000));
        let (second, second_transport) = notifier(ConfigOverrides::new().with_throttle_ms(60_000));

        assert!(first.send("a", NotificationOptions::default()).await.success);
        assert!(second.send("a", NotificationOptions::default()).await.success);

        assert_eq!(first_transport.single_calls(), 1);
        assert_eq!(second_transport.single_calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_resolves_receivers() {
        let transport = Arc::new(RecordingTransport::new());
        let notifier = Notifier::with_transport(
            config(ConfigOverrides::new().with_batch_delay_ms(60_000)),
            transport.clone(),
        );
        let receiver = notifier.queue.enqueue(
            NotificationPayload::new("a", &NotificationOptions::default()),
            notifier.config().endpoint(),
        );

        drop(notifier);

        let resp = receiver.await.unwrap();
        assert_eq!(resp.error.as_deref(), Some(QUEUE_CLEARED_ERROR));
    }
}
