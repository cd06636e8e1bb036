//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod checkpoint_store;
mod job_target;
mod segment_storage;
mod synthesizer;

pub use checkpoint_store::{CheckpointError, CheckpointStorePort};
pub use job_target::{JobTargetPort, TargetError};
pub use segment_storage::{SegmentStorageError, SegmentStoragePort};
pub use synthesizer::{SynthesisError, SynthesisRequest, SynthesizerPort};
