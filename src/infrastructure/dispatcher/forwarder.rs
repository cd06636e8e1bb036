//! Round-Robin Dispatcher - 请求转发
//!
//! 每个进入的请求选择一个后端（轮询），原样转发请求体和请求头
//! （去掉 Host 等逐跳头）。后端失败直接以 502 暴露给调用方，不换后端重试。
//!
//! 响应按 Content-Type 区分：JSON 解码后重新编码，其它（音频）逐字节透传。

use std::time::{Duration, Instant};

use axum::body::Bytes;
use futures_util::future::join_all;
use http::{header, HeaderMap, HeaderName, Method, StatusCode};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::application::JobError;

use super::backend_pool::{BackendPool, DispatcherStats, SelectedBackend};

/// 转发时去掉的逐跳请求头
const HOP_HEADERS: [HeaderName; 4] = [
    header::HOST,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
];

/// 调度器配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub backends: Vec<String>,
    /// 转发超时
    pub forward_timeout: Duration,
    /// 健康探测超时
    pub health_timeout: Duration,
    /// 未被查询的任务路由记录保留时间
    pub affinity_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                "http://localhost:5000".to_string(),
                "http://localhost:5001".to_string(),
                "http://localhost:5002".to_string(),
            ],
            forward_timeout: Duration::from_secs(120),
            health_timeout: Duration::from_secs(2),
            affinity_ttl: Duration::from_secs(3600),
        }
    }
}

/// 待转发的请求
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// 包含查询串的路径，如 `/tts`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 后端响应体
#[derive(Debug, Clone)]
pub enum ForwardedBody {
    Json(Value),
    Binary(Bytes),
}

/// 后端响应
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub backend: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ForwardedBody,
}

impl ForwardedResponse {
    /// JSON 响应体中的字符串字段
    pub fn json_str(&self, field: &str) -> Option<&str> {
        match &self.body {
            ForwardedBody::Json(value) => value.get(field).and_then(Value::as_str),
            ForwardedBody::Binary(_) => None,
        }
    }
}

/// 单个后端的健康状况
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub url: String,
    /// "ok" 或 "error"
    pub status: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 调度器健康报告
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherHealth {
    pub status: &'static str,
    pub load_balancer: &'static str,
    pub backend_servers: usize,
    pub healthy_backends: usize,
    pub backends: Vec<BackendHealth>,
    pub stats: DispatcherStats,
}

/// 轮询调度器
pub struct Dispatcher {
    config: DispatcherConfig,
    pool: BackendPool,
    client: Client,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, JobError> {
        let pool = BackendPool::new(config.backends.clone(), config.affinity_ttl);
        if pool.is_empty() {
            return Err(JobError::bad_request("Dispatcher needs at least one backend"));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| JobError::backend_unavailable("client", e.to_string()))?;

        Ok(Self {
            config,
            pool,
            client,
        })
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// 转发一个顶层请求到下一个后端
    pub async fn forward(&self, request: ForwardRequest) -> Result<ForwardedResponse, JobError> {
        let backend = self
            .pool
            .select()
            .ok_or_else(|| JobError::bad_request("No backend configured"))?;

        tracing::info!(
            backend = %backend.url,
            method = %request.method,
            path = %request.path,
            body_size = request.body.len(),
            "Forwarding request"
        );

        let response = self.send(&backend, request).await?;

        // 异步提交或同步等待超时：任务留在该后端，记录下来供状态查询路由
        if matches!(
            response.status,
            StatusCode::ACCEPTED | StatusCode::GATEWAY_TIMEOUT
        ) {
            if let Some(request_id) = response.json_str("request_id") {
                self.pool.bind(request_id, backend.index);
            }
        }

        Ok(response)
    }

    /// 查询异步任务状态，路由到任务所在的后端
    ///
    /// 未知 id 直接返回 None，由调用方回复 not_found
    pub async fn status(
        &self,
        request_id: &str,
        headers: HeaderMap,
    ) -> Result<Option<ForwardedResponse>, JobError> {
        let backend = match self.pool.owner(request_id) {
            Some(backend) => backend,
            None => return Ok(None),
        };

        let request = ForwardRequest {
            method: Method::GET,
            path: format!("/tts/status/{}", request_id),
            headers,
            body: Bytes::new(),
        };
        let response = self.send(&backend, request).await?;

        let finished = matches!(
            response.json_str("status"),
            Some("completed" | "failed" | "not_found")
        );
        if finished {
            self.pool.release(request_id);
        }

        Ok(Some(response))
    }

    /// 探测所有后端的健康状态
    ///
    /// 单个后端不可达不会让整体失败，只在该后端上标记
    pub async fn health(&self) -> DispatcherHealth {
        let checks = self.pool.urls().iter().map(|url| self.check_backend(url));
        let backends = join_all(checks).await;
        let healthy_backends = backends.iter().filter(|b| b.healthy).count();

        DispatcherHealth {
            status: "ok",
            load_balancer: "round-robin",
            backend_servers: self.pool.len(),
            healthy_backends,
            backends,
            stats: self.pool.stats(),
        }
    }

    async fn check_backend(&self, url: &str) -> BackendHealth {
        let result = self
            .client
            .get(format!("{}/health", url))
            .timeout(self.config.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                let body = response.json::<Value>().await.ok();
                BackendHealth {
                    url: url.to_string(),
                    status: "ok",
                    healthy: true,
                    response: body,
                    error: None,
                }
            }
            Ok(response) => BackendHealth {
                url: url.to_string(),
                status: "error",
                healthy: false,
                response: None,
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => BackendHealth {
                url: url.to_string(),
                status: "error",
                healthy: false,
                response: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// 发送到指定后端并记录统计（锁外执行网络调用）
    async fn send(
        &self,
        backend: &SelectedBackend,
        request: ForwardRequest,
    ) -> Result<ForwardedResponse, JobError> {
        let mut headers = request.headers;
        for name in HOP_HEADERS.iter() {
            headers.remove(name);
        }

        let started = Instant::now();
        let result = self
            .client
            .request(request.method, format!("{}{}", backend.url, request.path))
            .headers(headers)
            .body(request.body)
            .timeout(self.config.forward_timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.pool.record(backend.index, false);
                let message = if e.is_timeout() {
                    format!(
                        "Timed out after {}s",
                        self.config.forward_timeout.as_secs()
                    )
                } else {
                    e.to_string()
                };
                tracing::error!(
                    backend = %backend.url,
                    error = %message,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Error forwarding to backend"
                );
                return Err(JobError::backend_unavailable(&backend.url, message));
            }
        };

        let status = response.status();
        let mut response_headers = response.headers().clone();
        let is_json = response_headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pool.record(backend.index, false);
                tracing::error!(backend = %backend.url, error = %e, "Failed to read backend response");
                return Err(JobError::backend_unavailable(&backend.url, e.to_string()));
            }
        };

        let body = if is_json {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => ForwardedBody::Json(value),
                Err(e) => {
                    self.pool.record(backend.index, false);
                    return Err(JobError::backend_unavailable(
                        &backend.url,
                        format!("Invalid JSON response: {}", e),
                    ));
                }
            }
        } else {
            ForwardedBody::Binary(bytes)
        };

        // 响应体已完整读取，长度由出站响应重新计算
        response_headers.remove(header::TRANSFER_ENCODING);
        response_headers.remove(header::CONNECTION);
        response_headers.remove(header::CONTENT_LENGTH);

        let success = status.is_success();
        self.pool.record(backend.index, success);

        tracing::info!(
            backend = %backend.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            json = is_json,
            "Response from backend"
        );

        Ok(ForwardedResponse {
            backend: backend.url.clone(),
            status,
            headers: response_headers,
            body,
        })
    }
}
