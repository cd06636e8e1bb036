//! Job Queue Server - 任务队列服务核心
//!
//! 独占一个推理资源，把并发提交串行化到该资源上

mod exclusive;
mod job_queue;
mod worker;

pub use exclusive::ExclusiveSynthesizer;
pub use job_queue::{JobQueue, JobQueueConfig, QueueStats, StatusLookup, SubmitReceipt};
pub use worker::QueueWorker;
