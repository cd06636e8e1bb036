//! Batch Client - 断点续跑的批处理客户端

mod progress;
mod subtitle_files;
mod worker_pool;

pub use progress::{ProgressReport, ProgressTracker};
pub use subtitle_files::{
    plan_sources, FileOutcome, FileReport, SegmentSettings, SubtitleBatch, SubtitleRunReport,
    SubtitleSource,
};
pub use worker_pool::{build_jobs, BatchRunner, BatchSummary};
