//! Persistence Layer - 数据持久化
//!
//! 批处理检查点的 JSON 文件存储

mod checkpoint_file;

pub use checkpoint_file::FileCheckpointStore;
