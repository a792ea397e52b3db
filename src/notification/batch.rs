//! 批量队列 - 缓冲待发送通知，延迟到期后合并为一个请求
//!
//! # 不变量
//! - 按插入顺序组装批量请求
//! - 定时器存在 ⇔ 队列非空且没有正在进行的 flush
//! - flush 先整体取出队列再发送，发送期间的新入队进入下一批
//! - 每个入队调用都会得到一个结果：成功、失败或 `queue cleared before sending`

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::payload::{BatchPayload, NotificationPayload};
use super::response::NotificationResponse;
use super::transport::{Endpoint, Transport};

/// 批量后端返回失败但没有错误文本时使用
const BATCH_FAILED_ERROR: &str = "Failed to send notification batch";

/// 队列中的一条通知
struct QueuedNotification {
    payload: NotificationPayload,
    endpoint: Endpoint,
    responder: oneshot::Sender<NotificationResponse>,
    enqueued_at: Instant,
}

/// 当前挂起的 flush 定时器
struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    entries: Vec<QueuedNotification>,
    timer: Option<PendingTimer>,
    next_timer_id: u64,
}

/// 批量队列，属于单个 `Notifier`
pub struct BatchQueue {
    state: Mutex<QueueState>,
    transport: Arc<dyn Transport>,
    delay: Duration,
    debug: bool,
}

impl BatchQueue {
    pub fn new(transport: Arc<dyn Transport>, delay: Duration, debug: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            transport,
            delay,
            debug,
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 入队，返回在批量发送完成（或队列清空）时得到结果的 receiver
    ///
    /// 需要在 tokio runtime 中调用（定时器通过 `tokio::spawn` 启动）。
    pub fn enqueue(
        self: &Arc<Self>,
        payload: NotificationPayload,
        endpoint: Endpoint,
    ) -> oneshot::Receiver<NotificationResponse> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();

        state.entries.push(QueuedNotification {
            payload,
            endpoint,
            responder: tx,
            enqueued_at: Instant::now(),
        });

        // 所属 runtime 已关闭时旧定时器不会再触发
        let timer_alive = state
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished());
        if !timer_alive {
            let id = state.next_timer_id;
            state.next_timer_id += 1;
            let queue: Weak<Self> = Arc::downgrade(self);
            let delay = self.delay;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(queue) = queue.upgrade() {
                    queue.flush_from_timer(id).await;
                }
            });
            state.timer = Some(PendingTimer { id, handle });
        }

        if self.debug {
            debug!(pending = state.entries.len(), "Notification queued for batch");
        }

        rx
    }

    /// 立即发送当前队列（取消定时器）；队列为空时不做任何事
    pub async fn flush(&self) {
        let entries = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.handle.abort();
            }
            std::mem::take(&mut state.entries)
        };
        self.send_entries(entries).await;
    }

    /// 定时器到期；已被取消或替换的定时器直接返回
    async fn flush_from_timer(&self, id: u64) {
        let entries = {
            let mut state = self.lock();
            if !state.timer.as_ref().is_some_and(|timer| timer.id == id) {
                return;
            }
            // 当前任务自身，不能 abort
            state.timer = None;
            std::mem::take(&mut state.entries)
        };
        self.send_entries(entries).await;
    }

    /// 按 (backendUrl, apiKey) 分组发送，并把每组结果分发给组内所有调用方
    async fn send_entries(&self, entries: Vec<QueuedNotification>) {
        if entries.is_empty() {
            return;
        }

        let mut groups: Vec<(Endpoint, Vec<QueuedNotification>)> = Vec::new();
        for entry in entries {
            match groups.iter_mut().find(|(endpoint, _)| *endpoint == entry.endpoint) {
                Some((_, group)) => group.push(entry),
                None => groups.push((entry.endpoint.clone(), vec![entry])),
            }
        }

        for (endpoint, group) in groups {
            let batch_size = group.len();
            let oldest_wait = group
                .first()
                .map(|e| e.enqueued_at.elapsed())
                .unwrap_or_default();
            let (payloads, responders): (Vec<_>, Vec<_>) = group
                .into_iter()
                .map(|e| (e.payload, e.responder))
                .unzip();

            let batch = BatchPayload::new(payloads);
            let response = self.transport.send_batch(&batch, &endpoint, self.debug).await;

            let response = if response.success {
                if self.debug {
                    info!(
                        batch_size,
                        backend_url = %endpoint.backend_url,
                        waited_ms = oldest_wait.as_millis() as u64,
                        "Notification batch delivered"
                    );
                }
                response.into_batched(batch_size)
            } else {
                if self.debug {
                    warn!(
                        batch_size,
                        backend_url = %endpoint.backend_url,
                        error = ?response.error,
                        "Notification batch failed"
                    );
                }
                NotificationResponse {
                    batched: None,
                    batch_size: None,
                    error: response
                        .error
                        .clone()
                        .filter(|e| !e.is_empty())
                        .or_else(|| Some(BATCH_FAILED_ERROR.to_string())),
                    ..response
                }
            };

            for responder in responders {
                // 调用方已放弃等待时忽略
                let _ = responder.send(response.clone());
            }
        }
    }

    /// 取消定时器，以失败结果结束所有待发送通知，返回被清除的数量
    ///
    /// 任何时候调用都安全（空队列时为 no-op）。
    pub fn shutdown(&self) -> usize {
        let entries = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.handle.abort();
            }
            std::mem::take(&mut state.entries)
        };

        let cleared = entries.len();
        for entry in entries {
            let _ = entry.responder.send(NotificationResponse::queue_cleared());
        }

        if cleared > 0 && self.debug {
            warn!(cleared, "Pending notifications cleared before sending");
        }
        cleared
    }

    /// 待发送数量
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否有挂起的 flush 定时器
    pub fn has_pending_timer(&self) -> bool {
        self.lock().timer.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("transport", &self.transport.name())
            .field("delay", &self.delay)
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::mock::RecordingTransport;
    use crate::notification::payload::NotificationOptions;
    use crate::notification::response::QUEUE_CLEARED_ERROR;

    const DELAY: Duration = Duration::from_millis(50);

    fn payload(message: &str) -> NotificationPayload {
        NotificationPayload::new(message, &NotificationOptions::default())
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("https://hooks.example.com/notify").with_api_key("key-a")
    }

    #[tokio::test]
    async fn test_two_enqueues_make_one_batch() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = BatchQueue::new(transport.clone(), DELAY, false);

        let a = queue.enqueue(payload("a"), endpoint());
        let b = queue.enqueue(payload("b"), endpoint());
        assert!(queue.has_pending_timer());

        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(transport.batch_calls(), 1);
        assert_eq!(transport.single_calls(), 0);
        let batches = transport.batches();
        assert_eq!(batches[0].batch_size, 2);
        assert_eq!(batches[0].notifications[0].message, "a");
        assert_eq!(batches[0].notifications[1].message, "b");

        for resp in [a, b] {
            assert!(resp.success);
            assert_eq!(resp.batched, Some(true));
            assert_eq!(resp.batch_size, Some(2));
        }
        assert!(!queue.has_pending_timer());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_batch_failure_resolves_everyone() {
        let transport = Arc::new(RecordingTransport::failing("Failed to send notification: 500 Internal Server Error"));
        let queue = BatchQueue::new(transport.clone(), DELAY, true);

        let a = queue.enqueue(payload("a"), endpoint());
        let b = queue.enqueue(payload("b"), endpoint());

        for resp in [a.await.unwrap(), b.await.unwrap()] {
            assert!(!resp.success);
            assert_eq!(resp.batched, None);
            assert_eq!(resp.batch_size, None);
            assert!(!resp.error.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_shutdown_clears_pending() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = BatchQueue::new(transport.clone(), Duration::from_secs(60), false);

        let a = queue.enqueue(payload("a"), endpoint());
        let b = queue.enqueue(payload("b"), endpoint());

        assert_eq!(queue.shutdown(), 2);
        assert!(!queue.has_pending_timer());

        for resp in [a.await.unwrap(), b.await.unwrap()] {
            assert!(!resp.success);
            assert_eq!(resp.error.as_deref(), Some(QUEUE_CLEARED_ERROR));
        }

        queue.flush().await;
        assert_eq!(transport.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_on_empty_queue_is_noop() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = BatchQueue::new(transport.clone(), DELAY, false);

        assert_eq!(queue.shutdown(), 0);
        assert_eq!(queue.shutdown(), 0);
        queue.flush().await;
        assert_eq!(transport.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_flush_cancels_timer() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = BatchQueue::new(transport.clone(), Duration::from_secs(60), false);

        let a = queue.enqueue(payload("a"), endpoint());
        queue.flush().await;

        assert!(!queue.has_pending_timer());
        assert_eq!(a.await.unwrap().batch_size, Some(1));
        assert_eq!(transport.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_groups_by_endpoint() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = BatchQueue::new(transport.clone(), DELAY, false);
        let other = Endpoint::new("https://other.example.com/notify");

        let a = queue.enqueue(payload("a"), endpoint());
        let b = queue.enqueue(payload("b"), other.clone());
        let c = queue.enqueue(payload("c"), endpoint());

        let (a, b, c) = (a.await.unwrap(), b.await.unwrap(), c.await.unwrap());

        assert_eq!(transport.batch_calls(), 2);
        let batches = transport.batches();
        let endpoints = transport.batch_endpoints();
        assert_eq!(endpoints[0], endpoint());
        assert_eq!(batches[0].batch_size, 2);
        assert_eq!(batches[0].notifications[1].message, "c");
        assert_eq!(endpoints[1], other);
        assert_eq!(batches[1].batch_size, 1);

        assert_eq!(a.batch_size, Some(2));
        assert_eq!(b.batch_size, Some(1));
        assert_eq!(c.batch_size, Some(2));
    }

    #[tokio::test]
    async fn test_enqueue_during_flush_starts_new_batch() {
        let transport = Arc::new(RecordingTransport::new().with_latency(Duration::from_millis(100)));
        let queue = BatchQueue::new(transport.clone(), DELAY, false);

        let a = queue.enqueue(payload("a"), endpoint());
        let flushing = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.flush().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 第一批正在发送，新入队进入新批次并启动新定时器
        let b = queue.enqueue(payload("b"), endpoint());
        assert_eq!(queue.len(), 1);
        assert!(queue.has_pending_timer());

        flushing.await.unwrap();
        assert_eq!(a.await.unwrap().batch_size, Some(1));
        assert_eq!(b.await.unwrap().batch_size, Some(1));
        assert_eq!(transport.batch_calls(), 2);
    }
}
