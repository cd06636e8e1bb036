//! Segment Storage Port - 批处理音频输出
//!
//! 按 sequence index 保存每个片段的音频

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// 片段存储错误
#[derive(Debug, Error)]
pub enum SegmentStorageError {
    #[error("IO error: {0}")]
    IoError(String),
}

/// Segment Storage Port
#[async_trait]
pub trait SegmentStoragePort: Send + Sync {
    /// 保存片段音频，返回写入位置
    async fn save_segment(&self, index: usize, data: &[u8]) -> Result<PathBuf, SegmentStorageError>;
}
