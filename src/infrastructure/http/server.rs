//! HTTP Server
//!
//! Axum HTTP 服务器启动和配置，队列服务与调度器共用

use std::future::Future;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use http::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::middleware::error_logging_middleware;

/// 请求体上限（文本请求，留足余量）
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP 服务器
pub struct HttpServer {
    name: &'static str,
    config: ServerConfig,
    routes: Router,
}

impl HttpServer {
    /// `name` 仅用于日志（"queue" / "dispatcher"）
    pub fn new(name: &'static str, config: ServerConfig, routes: Router) -> Self {
        Self {
            name,
            config,
            routes,
        }
    }

    /// 挂载公共中间件
    fn build_router(self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([CONTENT_TYPE])
            .expose_headers(Any)
            .max_age(Duration::from_secs(3600));

        self.routes
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .layer(middleware::from_fn(error_logging_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// 启动服务器，`shutdown_signal` 完成后停止接收新连接并等待在途请求结束
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = self.name;
        let addr = self.config.addr();
        let router = self.build_router();

        let listener = TcpListener::bind(&addr).await?;
        info!(server = name, addr = %addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        info!(server = name, "HTTP server stopped");
        Ok(())
    }
}
