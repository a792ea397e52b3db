//! HTTP 发送层 - 单条和批量 POST，带请求超时
//!
//! 所有传输/HTTP 失败都转换为 `success=false` 的响应，不向调用方抛错。

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::payload::{BatchPayload, NotificationPayload};
use super::response::NotificationResponse;

/// 请求超时
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 错误详情最大长度
const MAX_ERROR_DETAIL: usize = 500;

/// 发送失败原因，`Display` 即响应中的 `error` 文本
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to send notification: request timed out after {}", format_duration(.after))]
    Timeout { after: Duration },

    #[error("Failed to send notification: {detail}")]
    Status { status: u16, detail: String },

    #[error("Failed to send notification: {0}")]
    Request(String),

    #[error("Failed to send notification: invalid backend URL: {0}")]
    InvalidUrl(String),
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() == 0 && d.as_secs() > 0 {
        let secs = d.as_secs();
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{} milliseconds", d.as_millis())
    }
}

/// 发送目标：后端地址 + 凭证，批量发送按它分组
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub backend_url: String,
    pub api_key: Option<String>,
    /// 解析相对地址的基础 URL
    pub origin: Option<String>,
}

impl Endpoint {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            api_key: None,
            origin: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// 单条发送地址
    pub fn url(&self) -> Result<Url, DispatchError> {
        self.resolve(&self.backend_url)
    }

    /// 批量发送地址 `<backendUrl>/batch`
    pub fn batch_url(&self) -> Result<Url, DispatchError> {
        self.resolve(&format!("{}/batch", self.backend_url.trim_end_matches('/')))
    }

    fn resolve(&self, raw: &str) -> Result<Url, DispatchError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let origin = self.origin.as_deref().ok_or_else(|| {
                    DispatchError::InvalidUrl(format!("{raw} is relative and no origin is configured"))
                })?;
                Url::parse(origin)
                    .and_then(|base| base.join(raw))
                    .map_err(|e| DispatchError::InvalidUrl(format!("{origin}{raw}: {e}")))
            }
            Err(e) => Err(DispatchError::InvalidUrl(format!("{raw}: {e}"))),
        }
    }

    fn bearer(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// 发送层 trait，`Notifier` 通过它发起网络请求
#[async_trait]
pub trait Transport: Send + Sync {
    /// 名称（用于日志）
    fn name(&self) -> &str;

    /// 发送单条通知
    async fn send_one(
        &self,
        payload: &NotificationPayload,
        endpoint: &Endpoint,
        debug: bool,
    ) -> NotificationResponse;

    /// 发送一组通知到 `<backendUrl>/batch`
    async fn send_batch(
        &self,
        batch: &BatchPayload,
        endpoint: &Endpoint,
        debug: bool,
    ) -> NotificationResponse;
}

/// 基于 reqwest 的 HTTP 发送层
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// 使用自定义 client（代理、TLS 等）
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// 设置请求超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST JSON，返回 2xx 响应中的 JSON 对象（非 JSON 或空 body 返回 None）
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        api_key: Option<&str>,
        body: &T,
    ) -> Result<Option<Map<String, Value>>, DispatchError> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let body = text.trim();
            let detail = if body.is_empty() {
                format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("Unknown"))
            } else {
                body.chars().take(MAX_ERROR_DETAIL).collect()
            };
            return Err(DispatchError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Ok(None),
        }
    }

    fn classify(&self, error: reqwest::Error) -> DispatchError {
        if error.is_timeout() {
            DispatchError::Timeout { after: self.timeout }
        } else {
            DispatchError::Request(error.to_string())
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// 把发送结果转换为响应，debug 模式下记录失败详情
fn into_response(
    result: Result<Option<Map<String, Value>>, DispatchError>,
    kind: &str,
    debug: bool,
) -> NotificationResponse {
    match result {
        Ok(Some(body)) => {
            let response = NotificationResponse::from_backend(body);
            if debug {
                if response.success {
                    debug!(kind, fields = response.extra.len(), "Notification delivered");
                } else {
                    warn!(kind, error = ?response.error, "Backend reported notification failure");
                }
            }
            response
        }
        Ok(None) => {
            if debug {
                debug!(kind, "Notification delivered (no JSON body)");
            }
            NotificationResponse::ok()
        }
        Err(e) => {
            if debug {
                warn!(kind, error = %e, "Notification send failed");
            }
            NotificationResponse::failed(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_one(
        &self,
        payload: &NotificationPayload,
        endpoint: &Endpoint,
        debug: bool,
    ) -> NotificationResponse {
        let result = match endpoint.url() {
            Ok(url) => self.post_json(url, endpoint.bearer(), payload).await,
            Err(e) => Err(e),
        };
        into_response(result, "single", debug)
    }

    async fn send_batch(
        &self,
        batch: &BatchPayload,
        endpoint: &Endpoint,
        debug: bool,
    ) -> NotificationResponse {
        let result = match endpoint.batch_url() {
            Ok(url) => self.post_json(url, endpoint.bearer(), batch).await,
            Err(e) => Err(e),
        };
        into_response(result, "batch", debug)
    }
}
