//! Domain Layer - 领域层
//!
//! - job: 合成任务与状态
//! - checkpoint: 批处理断点记录
//! - subtitle: 字幕文本提取

pub mod checkpoint;
pub mod job;
pub mod subtitle;

pub use checkpoint::{Checkpoint, FailedEntry};
pub use job::{preview, Job, JobOutcome, JobState, SegmentJob, SynthesizedAudio};
pub use subtitle::extract_segments;
