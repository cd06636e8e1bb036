//! Checkpoint File - JSON 文件检查点存储
//!
//! 每次保存都写入临时文件并 fsync，再原子改名覆盖旧文件，
//! 进程在任意时刻被杀都不会留下半个检查点。

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{CheckpointError, CheckpointStorePort};
use crate::domain::Checkpoint;

/// JSON 文件检查点存储
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(e: std::io::Error) -> CheckpointError {
    CheckpointError::IoError(e.to_string())
}

#[async_trait]
impl CheckpointStorePort for FileCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let checkpoint: Checkpoint = serde_json::from_slice(&data)
            .map_err(|e| CheckpointError::Corrupted(format!("{}: {}", self.path.display(), e)))?;

        tracing::info!(
            path = %self.path.display(),
            completed = checkpoint.completed.len(),
            in_progress = checkpoint.in_progress.len(),
            failed = checkpoint.failed.len(),
            "Checkpoint loaded"
        );

        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut checkpoint = checkpoint.clone();
        checkpoint.last_updated = Some(Utc::now());

        let json = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| CheckpointError::IoError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path).await.map_err(io_error)?;
        file.write_all(&json).await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await.map_err(io_error)?;

        tracing::trace!(path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn delete(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}
