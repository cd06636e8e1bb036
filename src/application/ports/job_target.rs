//! Job Target Port - 批处理客户端的提交目标
//!
//! 目标可以是单个队列服务，也可以是前面的调度器，对客户端来说没有区别

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SegmentJob;

/// 提交错误
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Job Target Port
#[async_trait]
pub trait JobTargetPort: Send + Sync {
    /// 同步提交任务，返回完整的音频字节
    async fn submit(&self, job: &SegmentJob) -> Result<Vec<u8>, TargetError>;

    /// 目标描述（日志用）
    fn describe(&self) -> String;
}
