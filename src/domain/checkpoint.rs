//! Checkpoint - 批处理进度记录
//!
//! 记录批次中每个任务（按 sequence index）的完成/失败情况，用于断点续跑。
//! 规则：
//! - `completed` 只增不减
//! - 失败记录只追加；失败的任务在下次运行时会自动重试
//! - 同一个 index 可能先出现在 `failed`、之后又进入 `completed`

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub index: usize,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// 批处理检查点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub completed: BTreeSet<usize>,
    #[serde(default)]
    pub in_progress: BTreeSet<usize>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算待处理的 index：`[0, total) \ completed`，按顺序返回
    ///
    /// 之前失败的任务也包含在内
    pub fn pending(&self, total: usize) -> Vec<usize> {
        (0..total)
            .filter(|index| !self.completed.contains(index))
            .collect()
    }

    pub fn mark_in_progress(&mut self, index: usize) {
        self.in_progress.insert(index);
        self.touch();
    }

    pub fn mark_completed(&mut self, index: usize) {
        self.in_progress.remove(&index);
        self.completed.insert(index);
        self.touch();
    }

    pub fn mark_failed(&mut self, index: usize, error: impl Into<String>) {
        self.in_progress.remove(&index);
        let timestamp = Utc::now();
        self.failed.push(FailedEntry {
            index,
            error: error.into(),
            timestamp,
        });
        self.last_updated = Some(timestamp);
    }

    /// 清空上次运行遗留的 in_progress（进程中断时正在处理的任务）
    ///
    /// 返回被清除的 index
    pub fn reset_in_progress(&mut self) -> Vec<usize> {
        let interrupted: Vec<usize> = self.in_progress.iter().copied().collect();
        if !interrupted.is_empty() {
            self.in_progress.clear();
            self.touch();
        }
        interrupted
    }

    /// 尚未被后续成功覆盖的失败记录（每个 index 只保留最近一条）
    pub fn outstanding_failures(&self) -> Vec<&FailedEntry> {
        let mut seen = BTreeSet::new();
        let mut outstanding: Vec<&FailedEntry> = self
            .failed
            .iter()
            .rev()
            .filter(|entry| !self.completed.contains(&entry.index))
            .filter(|entry| seen.insert(entry.index))
            .collect();
        outstanding.sort_by_key(|entry| entry.index);
        outstanding
    }

    /// 批次内的所有任务是否都已完成
    pub fn is_finished(&self, total: usize) -> bool {
        (0..total).all(|index| self.completed.contains(&index))
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_excludes_only_completed() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_completed(0);
        checkpoint.mark_completed(2);
        checkpoint.mark_failed(3, "HTTP 500");

        assert_eq!(checkpoint.pending(5), vec![1, 3, 4]);
    }

    #[test]
    fn test_completion_clears_in_progress() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_in_progress(1);
        assert!(checkpoint.in_progress.contains(&1));

        checkpoint.mark_completed(1);
        assert!(checkpoint.in_progress.is_empty());
        assert!(checkpoint.completed.contains(&1));
        assert!(checkpoint.last_updated.is_some());
    }

    #[test]
    fn test_failure_then_success_is_not_outstanding() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_in_progress(4);
        checkpoint.mark_failed(4, "timeout");
        assert_eq!(checkpoint.outstanding_failures().len(), 1);

        checkpoint.mark_completed(4);
        assert!(checkpoint.outstanding_failures().is_empty());
        // 失败历史保留
        assert_eq!(checkpoint.failed.len(), 1);
    }

    #[test]
    fn test_outstanding_failures_keep_latest_per_index() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_failed(2, "first");
        checkpoint.mark_failed(1, "other");
        checkpoint.mark_failed(2, "second");

        let outstanding = checkpoint.outstanding_failures();
        assert_eq!(outstanding.len(), 2);
        assert_eq!(outstanding[0].index, 1);
        assert_eq!(outstanding[1].error, "second");
    }

    #[test]
    fn test_reset_in_progress() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_in_progress(7);
        checkpoint.mark_in_progress(8);

        assert_eq!(checkpoint.reset_in_progress(), vec![7, 8]);
        assert!(checkpoint.in_progress.is_empty());
        assert!(checkpoint.reset_in_progress().is_empty());
    }

    #[test]
    fn test_missing_fields_deserialize_as_empty() {
        let checkpoint: Checkpoint = serde_json::from_str(r#"{"completed": [3, 1]}"#).unwrap();
        assert_eq!(checkpoint.completed.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert!(checkpoint.failed.is_empty());
        assert!(checkpoint.last_updated.is_none());
    }

    #[test]
    fn test_is_finished() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_completed(0);
        assert!(!checkpoint.is_finished(2));
        checkpoint.mark_completed(1);
        assert!(checkpoint.is_finished(2));
        assert!(Checkpoint::new().is_finished(0));
    }
}
