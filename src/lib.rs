//! TTS Farm - 语音合成任务分发系统
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Job: 合成任务与状态
//! - Checkpoint: 批处理检查点
//! - Subtitle: SRT 片段提取
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Synthesizer, JobTarget, CheckpointStore, SegmentStorage）
//! - Error: 任务错误分类
//!
//! 基础设施层 (infrastructure/):
//! - Queue: 任务队列服务，独占一个推理资源
//! - Dispatcher: 多后端轮询调度
//! - Batch: 断点续跑的批处理客户端
//! - HTTP: 队列服务与调度器的 REST API
//! - Adapters: 推理服务客户端、提交目标、片段存储
//! - Persistence: 检查点文件

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
