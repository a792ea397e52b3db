//! 测试用的记录型发送层

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::payload::{BatchPayload, NotificationPayload};
use super::response::NotificationResponse;
use super::transport::{Endpoint, Transport};

/// 记录每次调用，按配置返回成功或失败
pub struct RecordingTransport {
    single_count: AtomicUsize,
    batch_count: AtomicUsize,
    singles: Mutex<Vec<(NotificationPayload, Endpoint)>>,
    batches: Mutex<Vec<(BatchPayload, Endpoint)>>,
    failure: Option<String>,
    latency: Duration,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            single_count: AtomicUsize::new(0),
            batch_count: AtomicUsize::new(0),
            singles: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            failure: None,
            latency: Duration::ZERO,
        }
    }

    /// 每次调用都返回失败
    pub fn failing(error: &str) -> Self {
        Self {
            failure: Some(error.to_string()),
            ..Self::new()
        }
    }

    /// 模拟网络延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn single_calls(&self) -> usize {
        self.single_count.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_count.load(Ordering::SeqCst)
    }

    pub fn singles(&self) -> Vec<NotificationPayload> {
        self.singles.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn batches(&self) -> Vec<BatchPayload> {
        self.batches.lock().unwrap().iter().map(|(b, _)| b.clone()).collect()
    }

    pub fn single_endpoints(&self) -> Vec<Endpoint> {
        self.singles.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn batch_endpoints(&self) -> Vec<Endpoint> {
        self.batches.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    async fn respond(&self) -> NotificationResponse {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.failure {
            Some(error) => NotificationResponse::failed(error.clone()),
            None => NotificationResponse::ok(),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_one(
        &self,
        payload: &NotificationPayload,
        endpoint: &Endpoint,
        _debug: bool,
    ) -> NotificationResponse {
        self.single_count.fetch_add(1, Ordering::SeqCst);
        self.singles
            .lock()
            .unwrap()
            .push((payload.clone(), endpoint.clone()));
        self.respond().await
    }

    async fn send_batch(
        &self,
        batch: &BatchPayload,
        endpoint: &Endpoint,
        _debug: bool,
    ) -> NotificationResponse {
        self.batch_count.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .push((batch.clone(), endpoint.clone()));
        self.respond().await
    }
}
