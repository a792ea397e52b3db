//! 限流模块 - 单独发送之间的最小间隔
//!
//! 判定是纯函数 `should_throttle`；唯一的写入点是单独发送尝试完成之后的 `record_send_at`。
//! 读和写之间存在竞争（两个几乎同时到达的调用可能都看到窗口已开），
//! 这是尽力而为的限流，不是硬保证。

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 是否应该拒绝本次发送
///
/// - 高优先级永不限流
/// - 从未发送过则放行
/// - 否则距上次发送不足 `throttle` 时限流
pub fn should_throttle(
    now: Instant,
    last_send_at: Option<Instant>,
    throttle: Duration,
    is_high_priority: bool,
) -> bool {
    if is_high_priority {
        return false;
    }
    match last_send_at {
        Some(last) => now.saturating_duration_since(last) < throttle,
        None => false,
    }
}

/// 剩余等待秒数，向上取整，保证调用方不会提前重试
pub fn retry_after_secs(now: Instant, last_send_at: Instant, throttle: Duration) -> u64 {
    let remaining = throttle.saturating_sub(now.saturating_duration_since(last_send_at));
    remaining.as_nanos().div_ceil(1_000_000_000) as u64
}

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Proceed,
    Throttled { retry_after_secs: u64 },
}

/// 限流器状态，属于单个 `Notifier`
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_send_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 判定（不修改状态）
    pub fn check(&self, throttle: Duration, is_high_priority: bool) -> ThrottleDecision {
        self.check_at(Instant::now(), throttle, is_high_priority)
    }

    /// 判定（带时间戳，用于测试）
    pub fn check_at(&self, now: Instant, throttle: Duration, is_high_priority: bool) -> ThrottleDecision {
        let last = self.last_send_at();
        if !should_throttle(now, last, throttle, is_high_priority) {
            return ThrottleDecision::Proceed;
        }
        match last {
            Some(last) => ThrottleDecision::Throttled {
                retry_after_secs: retry_after_secs(now, last, throttle),
            },
            None => ThrottleDecision::Proceed,
        }
    }

    /// 记录一次单独发送尝试（成功或失败都计入）
    pub fn record_send(&self) {
        self.record_send_at(Instant::now());
    }

    /// 记录一次单独发送尝试（带时间戳，用于测试）
    pub fn record_send_at(&self, now: Instant) {
        let mut last = self.last_send_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(now);
    }

    pub fn last_send_at(&self) -> Option<Instant> {
        *self.last_send_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}
