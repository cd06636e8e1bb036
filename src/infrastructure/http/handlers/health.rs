//! Health Handlers
//!
//! 队列服务只报告计数；调度器主动探测每个后端

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::infrastructure::dispatcher::DispatcherHealth;
use crate::infrastructure::http::dto::QueueHealthResponse;
use crate::infrastructure::http::state::{DispatcherState, QueueState};

/// 队列服务健康检查：不探测推理资源，只返回最近的计数
pub async fn queue_health(State(state): State<Arc<QueueState>>) -> Json<QueueHealthResponse> {
    Json(QueueHealthResponse {
        status: "ok",
        service: "tts-queue",
        version: env!("CARGO_PKG_VERSION"),
        stats: state.queue.stats(),
    })
}

/// 调度器健康检查：单个后端不可达不影响整体结果
pub async fn dispatcher_health(State(state): State<Arc<DispatcherState>>) -> Json<DispatcherHealth> {
    Json(state.dispatcher.health().await)
}
