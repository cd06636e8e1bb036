//! HTTP Middleware
//!
//! HTTP 状态码错误日志中间件

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// HTTP 状态码错误日志中间件
///
/// 4xx 记 warn，5xx 记 error；成功响应只在 debug 级别记录耗时。
/// 响应带 `X-Request-Id` 时一并记录，便于与任务日志对应
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms,
            request_id = %request_id,
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms,
            "HTTP client error"
        );
    } else {
        tracing::debug!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms,
            request_id = %request_id,
            "HTTP request served"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::{get, post},
        Router,
    };
    use tower::util::ServiceExt;

    fn create_test_router() -> Router {
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/tts", post(|| async { StatusCode::BAD_REQUEST }))
            .route(
                "/tts/json",
                post(|| async { (StatusCode::BAD_GATEWAY, [("x-request-id", "abc")]) }),
            )
            .layer(axum::middleware::from_fn(error_logging_middleware))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        create_test_router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        assert_eq!(status_of("GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_client_error_passes_through() {
        assert_eq!(status_of("POST", "/tts").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_server_error_passes_through() {
        assert_eq!(status_of("POST", "/tts/json").await, StatusCode::BAD_GATEWAY);
    }
}
