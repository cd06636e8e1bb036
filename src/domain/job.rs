//! Job - 单个合成任务
//!
//! 一个 Job 表示“把一段文本渲染为音频”。Job 在提交时创建，
//! 状态流转：queued → in_progress → {completed | failed}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 合成任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// 全局唯一 ID（提交时生成）
    pub id: String,
    /// 要合成的文本
    pub text: String,
    /// 参考音频路径
    pub ref_audio: String,
    /// 参考音频对应的文本
    pub ref_text: String,
    /// 语速倍率
    pub speed: f32,
}

impl Job {
    pub fn new(
        text: impl Into<String>,
        ref_audio: impl Into<String>,
        ref_text: impl Into<String>,
        speed: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            ref_audio: ref_audio.into(),
            ref_text: ref_text.into(),
            speed,
        }
    }

    /// 日志用的文本预览
    pub fn preview(&self) -> String {
        preview(&self.text, 50)
    }
}

/// 批处理片段任务（客户端侧）
///
/// 参考音频/文本为 None 时不随请求发送，由服务端使用自己的默认值
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentJob {
    /// 在批次中的位置（断点续跑时保持不变）
    pub index: usize,
    pub text: String,
    pub ref_audio: Option<String>,
    pub ref_text: Option<String>,
    pub speed: f32,
}

impl SegmentJob {
    pub fn preview(&self) -> String {
        preview(&self.text, 50)
    }
}

/// 截断文本用于日志（按字符而不是字节）
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// 合成结果
///
/// 核心层只关心字节长度和时长，不解析音频内容
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: u64,
}

impl SynthesizedAudio {
    /// 时长 = 样本数 / 采样率
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / f64::from(self.sample_rate)
    }

    pub fn audio_size(&self) -> usize {
        self.audio.len()
    }
}

/// 任务状态
///
/// 终态（Completed/Failed）携带结果，结果只在第一次读取时交付
#[derive(Debug, Clone)]
pub enum JobState {
    Queued,
    InProgress,
    Completed(Arc<SynthesizedAudio>),
    Failed(String),
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InProgress => "in_progress",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed(_) | JobState::Failed(_))
    }
}

/// 一次任务的最终结果（已从结果表中取出）
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: Job,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobOutcome {
    /// 从提交到结束的耗时（毫秒）
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.submitted_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_samples() {
        let audio = SynthesizedAudio {
            audio: vec![0; 10],
            sample_rate: 24000,
            sample_count: 48000,
        };
        assert_eq!(audio.duration_secs(), 2.0);
        assert_eq!(audio.audio_size(), 10);
    }

    #[test]
    fn test_zero_sample_rate_has_no_duration() {
        let audio = SynthesizedAudio {
            audio: Vec::new(),
            sample_rate: 0,
            sample_count: 100,
        };
        assert_eq!(audio.duration_secs(), 0.0);
    }

    #[test]
    fn test_preview_counts_chars() {
        assert_eq!(preview("xin chào", 50), "xin chào");
        assert_eq!(preview("xin chào thế giới", 8), "xin chào...");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(JobState::Failed("boom".into()).is_terminal());
        assert_eq!(JobState::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn test_new_jobs_get_distinct_ids() {
        let a = Job::new("a", "ref.wav", "ref", 1.0);
        let b = Job::new("a", "ref.wav", "ref", 1.0);
        assert_ne!(a.id, b.id);
    }
}
