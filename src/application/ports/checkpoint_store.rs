//! Checkpoint Store Port - 检查点持久化
//!
//! 每次状态变化都整体写入，不做批量合并

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Checkpoint;

/// 检查点存储错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),
}

/// Checkpoint Store Port
#[async_trait]
pub trait CheckpointStorePort: Send + Sync {
    /// 读取检查点，不存在时返回 None
    async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError>;

    /// 持久化完整检查点，返回前数据必须已落盘
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// 删除检查点（批次全部成功）
    async fn delete(&self) -> Result<(), CheckpointError>;
}
