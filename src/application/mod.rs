//! 应用层
//!
//! 包含：
//! - ports: 六边形架构端口定义（Synthesizer、JobTarget、CheckpointStore、SegmentStorage）
//! - error: 任务错误分类

pub mod error;
pub mod ports;

pub use error::JobError;

pub use ports::{
    CheckpointError, CheckpointStorePort, JobTargetPort, SegmentStorageError, SegmentStoragePort,
    SynthesisError, SynthesisRequest, SynthesizerPort, TargetError,
};
