//! HTTP Routes
//!
//! 队列服务与调度器对外暴露同一组端点，客户端无需区分：
//! - /health              GET   健康检查与统计
//! - /tts                 POST  提交任务（同步返回音频，或 async 返回 202）
//! - /tts/json            POST  同步提交，返回元数据
//! - /tts/status/:id      GET   查询异步任务状态

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::{DispatcherState, QueueState};

/// 队列服务路由
pub fn queue_routes(state: Arc<QueueState>) -> Router {
    Router::new()
        .route("/health", get(handlers::queue_health))
        .route("/tts", post(handlers::submit_tts))
        .route("/tts/json", post(handlers::submit_tts_json))
        .route("/tts/status/:request_id", get(handlers::tts_status))
        .with_state(state)
}

/// 调度器路由
pub fn dispatcher_routes(state: Arc<DispatcherState>) -> Router {
    Router::new()
        .route("/health", get(handlers::dispatcher_health))
        .route("/tts", post(handlers::forward))
        .route("/tts/json", post(handlers::forward))
        .route("/tts/status/:request_id", get(handlers::proxy_status))
        .with_state(state)
}
