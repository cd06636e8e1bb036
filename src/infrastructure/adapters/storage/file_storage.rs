//! File Storage - 批处理片段音频的文件系统存储
//!
//! 片段按 sequence index 命名：`audio_0000.wav`、`audio_0001.wav` ...

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{SegmentStorageError, SegmentStoragePort};

/// 文件系统片段存储
pub struct FileSegmentStorage {
    /// 输出目录
    base_dir: PathBuf,
}

impl FileSegmentStorage {
    /// 创建存储，目录不存在时自动创建
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, SegmentStorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| SegmentStorageError::IoError(e.to_string()))?;

        Ok(Self { base_dir })
    }

    /// 片段音频路径
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.base_dir.join(format!("audio_{:04}.wav", index))
    }
}

#[async_trait]
impl SegmentStoragePort for FileSegmentStorage {
    async fn save_segment(&self, index: usize, data: &[u8]) -> Result<PathBuf, SegmentStorageError> {
        let path = self.segment_path(index);
        // 先写临时文件再改名，中断时不会留下半个文件
        let tmp_path = path.with_extension("wav.part");

        fs::write(&tmp_path, data)
            .await
            .map_err(|e| SegmentStorageError::IoError(e.to_string()))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| SegmentStorageError::IoError(e.to_string()))?;

        tracing::debug!(index = index, size = data.len(), path = %path.display(), "Saved segment audio");

        Ok(path)
    }
}
