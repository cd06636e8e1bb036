//! 应用层错误定义
//!
//! 任务处理的统一错误分类

use std::time::Duration;

use thiserror::Error;

/// 任务错误
#[derive(Debug, Error)]
pub enum JobError {
    /// 请求缺少必填字段，不重试
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 与后端通信失败（网络错误或超时）
    #[error("Backend {backend} unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// 推理资源对该任务报错
    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    /// 同步调用方等待超时，任务仍可能在稍后完成
    #[error("Timed out after {:.3}s waiting for job {request_id}", .waited.as_secs_f64())]
    Timeout { request_id: String, waited: Duration },

    /// 结果已被其他调用方取走
    #[error("Result for job {0} was already retrieved")]
    ResultGone(String),

    /// 队列已满
    #[error("Job queue is full")]
    QueueFull,

    /// 队列已关闭
    #[error("Job queue is shutting down")]
    ShuttingDown,
}

impl JobError {
    /// 创建请求错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 创建后端不可用错误
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }
}
