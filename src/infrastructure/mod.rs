//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现，以及三个组件：
//! - queue: 任务队列服务核心
//! - dispatcher: 轮询调度器核心
//! - batch: 断点续跑的批处理客户端

pub mod adapters;
pub mod batch;
pub mod dispatcher;
pub mod http;
pub mod persistence;
pub mod queue;

pub use batch::{BatchRunner, BatchSummary};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use persistence::FileCheckpointStore;
pub use queue::{JobQueue, JobQueueConfig};
