//! Progress Tracker - 批处理进度与 ETA

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;

/// 进度快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// 本次运行需要处理的任务数
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub remaining: usize,
    pub elapsed_secs: f64,
    /// 平均任务耗时 × 剩余数量；还没有完成的任务时为 None
    pub eta_secs: Option<f64>,
}

/// 进度跟踪
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    total: usize,
    completed: usize,
    failed: usize,
    in_progress: BTreeSet<usize>,
    /// 已完成任务的耗时总和
    completed_time: Duration,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            completed: 0,
            failed: 0,
            in_progress: BTreeSet::new(),
            completed_time: Duration::ZERO,
        }
    }

    pub fn start(&mut self, index: usize) {
        self.in_progress.insert(index);
    }

    pub fn complete(&mut self, index: usize, took: Duration) {
        self.in_progress.remove(&index);
        self.completed += 1;
        self.completed_time += took;
    }

    pub fn fail(&mut self, index: usize) {
        self.in_progress.remove(&index);
        self.failed += 1;
    }

    /// 已完成任务的平均耗时
    pub fn mean_job_duration(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        Some(self.completed_time / self.completed as u32)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self) -> ProgressReport {
        let remaining = self.total.saturating_sub(self.completed + self.failed);
        let eta_secs = self
            .mean_job_duration()
            .map(|mean| mean.as_secs_f64() * remaining as f64);

        ProgressReport {
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            in_progress: self.in_progress.len(),
            remaining,
            elapsed_secs: self.elapsed().as_secs_f64(),
            eta_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_eta_before_first_completion() {
        let mut tracker = ProgressTracker::new(4);
        tracker.start(0);
        let report = tracker.report();
        assert_eq!(report.in_progress, 1);
        assert_eq!(report.remaining, 4);
        assert!(report.eta_secs.is_none());
    }

    #[test]
    fn test_eta_is_mean_times_remaining() {
        let mut tracker = ProgressTracker::new(5);
        tracker.start(0);
        tracker.start(1);
        tracker.complete(0, Duration::from_secs(2));
        tracker.complete(1, Duration::from_secs(4));
        tracker.start(2);
        tracker.fail(2);

        let report = tracker.report();
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.in_progress, 0);
        assert_eq!(report.remaining, 2);
        assert_eq!(tracker.mean_job_duration(), Some(Duration::from_secs(3)));
        assert_eq!(report.eta_secs, Some(6.0));
    }
}
