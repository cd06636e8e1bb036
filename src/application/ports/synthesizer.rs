//! Synthesizer Port - 推理资源抽象
//!
//! 外部推理库只暴露一个调用：文本 + 参考音频 → 音频。
//! 该资源是独占的，同一时刻只能执行一个任务，由调用方保证互斥

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SynthesizedAudio;

/// 推理错误
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 推理请求
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// 要合成的文本
    pub text: String,
    /// 参考音频路径
    pub ref_audio: String,
    /// 参考音频文本
    pub ref_text: String,
    /// 语速倍率
    pub speed: f32,
}

/// Synthesizer Port
#[async_trait]
pub trait SynthesizerPort: Send + Sync {
    /// 执行一次推理
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, SynthesisError>;
}
