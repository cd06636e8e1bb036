//! Checkpointed Worker Pool - 可断点续跑的批处理客户端
//!
//! 固定大小的滑动窗口：先放入前 W 个待处理任务，任意一个结束（成功或失败）
//! 立即补上下一个，直到没有待处理任务。
//!
//! 每次状态变化（in_progress / completed / failed）都在检查点锁内整体落盘，
//! 落盘完成后 worker 才能继续。检查点写入失败是整个运行的致命错误。

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    CheckpointError, CheckpointStorePort, JobTargetPort, SegmentStoragePort,
};
use crate::domain::{Checkpoint, FailedEntry, SegmentJob};

use super::progress::{ProgressReport, ProgressTracker};

/// 用字幕片段构建批次任务，index 即片段位置
///
/// 参考音频/文本为 None 时交给服务端默认值
pub fn build_jobs(
    segments: Vec<String>,
    ref_audio: Option<&str>,
    ref_text: Option<&str>,
    speed: f32,
) -> Vec<SegmentJob> {
    segments
        .into_iter()
        .enumerate()
        .map(|(index, text)| SegmentJob {
            index,
            text,
            ref_audio: ref_audio.map(str::to_string),
            ref_text: ref_text.map(str::to_string),
            speed,
        })
        .collect()
}

/// 批处理结果汇总
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// 批次总任务数
    pub total: usize,
    /// 本次运行开始时待处理的任务数
    pub attempted: usize,
    /// 本次运行完成的任务数
    pub completed_this_run: usize,
    /// 累计完成的任务数
    pub completed_total: usize,
    /// 仍未解决的失败
    pub failed: Vec<FailedEntry>,
    pub elapsed: Duration,
    pub mean_job_secs: Option<f64>,
    /// 被中断（未处理完就停止）
    pub interrupted: bool,
    /// 检查点是否保留（未全部成功）
    pub checkpoint_retained: bool,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        !self.checkpoint_retained
    }
}

/// 单个任务的处理结果
enum TaskOutcome {
    Completed,
    Failed,
}

/// 各 worker 共享的状态
struct BatchContext {
    jobs: Vec<SegmentJob>,
    target: Arc<dyn JobTargetPort>,
    storage: Arc<dyn SegmentStoragePort>,
    store: Arc<dyn CheckpointStorePort>,
    checkpoint: Mutex<Checkpoint>,
    progress: StdMutex<ProgressTracker>,
}

impl BatchContext {
    async fn mark_in_progress(&self, index: usize) -> Result<(), CheckpointError> {
        let mut checkpoint = self.checkpoint.lock().await;
        checkpoint.mark_in_progress(index);
        self.store.save(&checkpoint).await?;
        drop(checkpoint);

        self.lock_progress().start(index);
        Ok(())
    }

    async fn mark_completed(&self, index: usize, took: Duration) -> Result<(), CheckpointError> {
        let mut checkpoint = self.checkpoint.lock().await;
        checkpoint.mark_completed(index);
        self.store.save(&checkpoint).await?;
        drop(checkpoint);

        self.lock_progress().complete(index, took);
        Ok(())
    }

    async fn mark_failed(&self, index: usize, error: String) -> Result<(), CheckpointError> {
        let mut checkpoint = self.checkpoint.lock().await;
        checkpoint.mark_failed(index, error);
        self.store.save(&checkpoint).await?;
        drop(checkpoint);

        self.lock_progress().fail(index);
        Ok(())
    }

    fn report(&self) -> ProgressReport {
        self.lock_progress().report()
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, ProgressTracker> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 处理单个任务：提交 → 保存音频 → 记录结果
    async fn process(self: Arc<Self>, index: usize) -> Result<TaskOutcome, CheckpointError> {
        let job = &self.jobs[index];
        self.mark_in_progress(index).await?;

        tracing::info!(index = index, text = %job.preview(), "Task started");
        let started = Instant::now();

        let result = match self.target.submit(job).await {
            Ok(audio) => self
                .storage
                .save_segment(index, &audio)
                .await
                .map(|path| (path, audio.len()))
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let took = started.elapsed();

        match result {
            Ok((path, size)) => {
                self.mark_completed(index, took).await?;
                tracing::info!(
                    index = index,
                    elapsed_ms = took.as_millis() as u64,
                    audio_size = size,
                    path = %path.display(),
                    "Task completed"
                );
                Ok(TaskOutcome::Completed)
            }
            Err(error) => {
                tracing::error!(index = index, error = %error, "Task failed");
                self.mark_failed(index, error).await?;
                Ok(TaskOutcome::Failed)
            }
        }
    }
}

/// 批处理客户端
pub struct BatchRunner {
    workers: usize,
    jobs: Vec<SegmentJob>,
    target: Arc<dyn JobTargetPort>,
    storage: Arc<dyn SegmentStoragePort>,
    store: Arc<dyn CheckpointStorePort>,
}

impl BatchRunner {
    pub fn new(
        workers: usize,
        jobs: Vec<SegmentJob>,
        target: Arc<dyn JobTargetPort>,
        storage: Arc<dyn SegmentStoragePort>,
        store: Arc<dyn CheckpointStorePort>,
    ) -> Self {
        Self {
            workers: workers.max(1),
            jobs,
            target,
            storage,
            store,
        }
    }

    /// 运行批次直到全部处理完或收到中断信号
    ///
    /// 中断时正在处理的任务不会被标记完成，下次运行会重新处理
    pub async fn run(self, shutdown: CancellationToken) -> Result<BatchSummary, CheckpointError> {
        let total = self.jobs.len();
        let mut checkpoint = self.store.load().await?.unwrap_or_default();

        let stale: Vec<usize> = checkpoint
            .completed
            .iter()
            .copied()
            .filter(|index| *index >= total)
            .collect();
        if !stale.is_empty() {
            tracing::warn!(indices = ?stale, total = total, "Checkpoint lists indices outside the batch");
        }

        let interrupted_last_run = checkpoint.reset_in_progress();
        if !interrupted_last_run.is_empty() {
            tracing::warn!(indices = ?interrupted_last_run, "Retrying tasks interrupted in the previous run");
        }

        let pending = checkpoint.pending(total);

        tracing::info!(
            target_server = %self.target.describe(),
            workers = self.workers,
            total = total,
            completed = checkpoint.completed.len(),
            remaining = pending.len(),
            "Batch starting"
        );

        let context = Arc::new(BatchContext {
            jobs: self.jobs,
            target: self.target,
            storage: self.storage,
            store: self.store,
            checkpoint: Mutex::new(checkpoint),
            progress: StdMutex::new(ProgressTracker::new(pending.len())),
        });

        let attempted = pending.len();
        let mut queue = pending.into_iter();
        let mut in_flight = JoinSet::new();
        let mut completed_this_run = 0usize;
        let mut interrupted = false;

        for index in queue.by_ref().take(self.workers) {
            in_flight.spawn(context.clone().process(index));
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    interrupted = true;
                    in_flight.abort_all();
                    tracing::warn!(in_flight = in_flight.len(), "Batch interrupted, checkpoint kept");
                    break;
                }
                joined = in_flight.join_next() => match joined {
                    Some(joined) => joined,
                    None => break,
                },
            };

            match joined {
                Ok(Ok(TaskOutcome::Completed)) => completed_this_run += 1,
                Ok(Ok(TaskOutcome::Failed)) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Checkpoint write failed, aborting batch");
                    in_flight.abort_all();
                    return Err(e);
                }
                Err(e) => tracing::error!(error = %e, "Worker task aborted"),
            }

            let report = context.report();
            tracing::info!(
                completed = report.completed,
                failed = report.failed,
                in_progress = report.in_progress,
                remaining = report.remaining,
                elapsed_secs = report.elapsed_secs,
                eta_secs = ?report.eta_secs,
                "Batch progress"
            );

            if let Some(next) = queue.next() {
                tracing::debug!(index = next, "Worker freed, submitting next task");
                in_flight.spawn(context.clone().process(next));
            }
        }

        // 等待被取消的任务真正退出，避免与下面的收尾并发写检查点
        while in_flight.join_next().await.is_some() {}

        let checkpoint = context.checkpoint.lock().await.clone();
        let failed: Vec<FailedEntry> = checkpoint
            .outstanding_failures()
            .into_iter()
            .cloned()
            .collect();

        let checkpoint_retained = interrupted || !checkpoint.is_finished(total);
        if checkpoint_retained {
            context.store.save(&checkpoint).await?;
        } else {
            context.store.delete().await?;
        }

        let (elapsed, mean_job_secs) = {
            let progress = context.lock_progress();
            (
                progress.elapsed(),
                progress.mean_job_duration().map(|d| d.as_secs_f64()),
            )
        };

        let summary = BatchSummary {
            total,
            attempted,
            completed_this_run,
            completed_total: checkpoint.completed.len(),
            failed,
            elapsed,
            mean_job_secs,
            interrupted,
            checkpoint_retained,
        };

        if summary.is_success() {
            tracing::info!(
                total = summary.total,
                completed_this_run = summary.completed_this_run,
                elapsed_secs = summary.elapsed.as_secs_f64(),
                mean_job_secs = ?summary.mean_job_secs,
                "Batch finished, checkpoint removed"
            );
        } else {
            tracing::warn!(
                total = summary.total,
                completed_total = summary.completed_total,
                failed = summary.failed.len(),
                interrupted = summary.interrupted,
                "Batch incomplete, checkpoint kept; re-run to retry"
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TargetError;
    use crate::infrastructure::adapters::FileSegmentStorage;
    use crate::infrastructure::persistence::FileCheckpointStore;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// 可编排的提交目标：按 index 记录成功次数
    #[derive(Default)]
    struct ScriptedTarget {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        successes: StdMutex<HashMap<usize, usize>>,
        finish_order: StdMutex<Vec<usize>>,
        fail: StdMutex<HashSet<usize>>,
        slow: HashMap<usize, u64>,
        /// 第 N 次调用时触发中断并挂起
        hang_on_call: StdMutex<Option<(usize, CancellationToken)>>,
    }

    impl ScriptedTarget {
        fn success_count(&self, index: usize) -> usize {
            self.successes.lock().unwrap().get(&index).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl JobTargetPort for ScriptedTarget {
        async fn submit(&self, job: &SegmentJob) -> Result<Vec<u8>, TargetError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            let hang = {
                let mut hang = self.hang_on_call.lock().unwrap();
                let due = matches!(hang.as_ref(), Some((n, _)) if *n == call);
                if due {
                    hang.take().map(|(_, token)| token)
                } else {
                    None
                }
            };
            if let Some(token) = hang {
                token.cancel();
                std::future::pending::<()>().await;
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let delay = self.slow.get(&job.index).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finish_order.lock().unwrap().push(job.index);

            if self.fail.lock().unwrap().contains(&job.index) {
                return Err(TargetError::HttpStatus {
                    status: 500,
                    body: "boom".to_string(),
                });
            }

            *self
                .successes
                .lock()
                .unwrap()
                .entry(job.index)
                .or_insert(0) += 1;
            Ok(job.text.clone().into_bytes())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn jobs(count: usize) -> Vec<SegmentJob> {
        build_jobs(
            (0..count).map(|i| format!("segment {}", i)).collect(),
            None,
            None,
            0.75,
        )
    }

    async fn runner(
        dir: &Path,
        workers: usize,
        count: usize,
        target: Arc<ScriptedTarget>,
    ) -> BatchRunner {
        let storage = FileSegmentStorage::new(dir.join("audio")).await.unwrap();
        let store = FileCheckpointStore::new(dir.join("audio").join(".checkpoint.json"));
        BatchRunner::new(
            workers,
            jobs(count),
            target,
            Arc::new(storage),
            Arc::new(store),
        )
    }

    fn checkpoint_path(dir: &Path) -> std::path::PathBuf {
        dir.join("audio").join(".checkpoint.json")
    }

    #[tokio::test]
    async fn test_all_success_removes_checkpoint() {
        let dir = tempdir().unwrap();
        let target = Arc::new(ScriptedTarget::default());

        let summary = runner(dir.path(), 3, 10, target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.completed_this_run, 10);
        assert!(summary.failed.is_empty());
        assert!(!checkpoint_path(dir.path()).exists());
        for index in 0..10 {
            assert_eq!(target.success_count(index), 1);
            assert!(dir
                .path()
                .join("audio")
                .join(format!("audio_{:04}.wav", index))
                .exists());
        }
        assert!(target.max_active.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_resume_after_interrupt_processes_each_job_once() {
        let dir = tempdir().unwrap();
        let target = Arc::new(ScriptedTarget::default());

        // 第一次运行：第 5 次调用时“进程被杀”
        let shutdown = CancellationToken::new();
        *target.hang_on_call.lock().unwrap() = Some((4, shutdown.clone()));
        let first = runner(dir.path(), 1, 10, target.clone())
            .await
            .run(shutdown)
            .await
            .unwrap();

        assert!(first.interrupted);
        assert_eq!(first.completed_total, 4);
        let saved: Checkpoint =
            serde_json::from_slice(&std::fs::read(checkpoint_path(dir.path())).unwrap()).unwrap();
        assert_eq!(saved.completed.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(saved.in_progress.contains(&4));

        // 第二次运行：使用同一个检查点
        let second = runner(dir.path(), 1, 10, target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(second.is_success());
        assert_eq!(second.attempted, 6);
        assert_eq!(second.completed_this_run, 6);
        for index in 0..10 {
            assert_eq!(target.success_count(index), 1, "index {}", index);
        }
        assert!(!checkpoint_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_resume_with_several_workers_skips_completed() {
        let dir = tempdir().unwrap();
        let first_target = Arc::new(ScriptedTarget::default());

        let shutdown = CancellationToken::new();
        *first_target.hang_on_call.lock().unwrap() = Some((7, shutdown.clone()));
        let first = runner(dir.path(), 3, 20, first_target.clone())
            .await
            .run(shutdown)
            .await
            .unwrap();

        assert!(first.interrupted);
        let saved: Checkpoint =
            serde_json::from_slice(&std::fs::read(checkpoint_path(dir.path())).unwrap()).unwrap();
        assert!(!saved.completed.is_empty());
        assert!(saved.completed.len() < 20);
        for index in &saved.completed {
            assert_eq!(first_target.success_count(*index), 1, "index {}", index);
        }

        // 第二次运行只处理检查点之外的任务，每个一次
        let second_target = Arc::new(ScriptedTarget::default());
        let second = runner(dir.path(), 3, 20, second_target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(second.is_success());
        assert_eq!(second.attempted, 20 - saved.completed.len());
        for index in 0..20 {
            let expected = usize::from(!saved.completed.contains(&index));
            assert_eq!(second_target.success_count(index), expected, "index {}", index);
        }
        assert!(second_target.max_active.load(Ordering::SeqCst) <= 3);
        assert!(!checkpoint_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_on_next_run() {
        let dir = tempdir().unwrap();
        let target = Arc::new(ScriptedTarget::default());
        target.fail.lock().unwrap().insert(2);

        let first = runner(dir.path(), 2, 5, target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(!first.is_success());
        assert_eq!(first.completed_this_run, 4);
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.failed[0].index, 2);
        let saved: Checkpoint =
            serde_json::from_slice(&std::fs::read(checkpoint_path(dir.path())).unwrap()).unwrap();
        assert_eq!(saved.failed.len(), 1);
        assert_eq!(saved.failed[0].index, 2);
        assert!(saved.failed[0].error.contains("HTTP 500"));

        // 后端恢复
        target.fail.lock().unwrap().clear();
        let calls_before = target.calls.load(Ordering::SeqCst);

        let second = runner(dir.path(), 2, 5, target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(second.is_success());
        assert_eq!(second.attempted, 1);
        assert_eq!(target.calls.load(Ordering::SeqCst) - calls_before, 1);
        assert_eq!(target.success_count(2), 1);
        assert!(!checkpoint_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_sliding_window_keeps_workers_busy() {
        let dir = tempdir().unwrap();
        let target = Arc::new(ScriptedTarget {
            slow: HashMap::from([(0, 300)]),
            ..Default::default()
        });

        let summary = runner(dir.path(), 2, 6, target.clone())
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(target.max_active.load(Ordering::SeqCst), 2);
        // 慢任务占住一个 worker 时，另一个 worker 处理完其余任务
        let order = target.finish_order.lock().unwrap().clone();
        assert_eq!(order.last(), Some(&0));
    }

    /// 写入总是失败的检查点存储
    struct BrokenStore;

    #[async_trait]
    impl CheckpointStorePort for BrokenStore {
        async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
            Ok(None)
        }

        async fn save(&self, _checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            Err(CheckpointError::IoError("read-only filesystem".to_string()))
        }

        async fn delete(&self) -> Result<(), CheckpointError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unwritable_checkpoint_is_fatal() {
        let dir = tempdir().unwrap();
        let storage = FileSegmentStorage::new(dir.path()).await.unwrap();
        let runner = BatchRunner::new(
            2,
            jobs(3),
            Arc::new(ScriptedTarget::default()),
            Arc::new(storage),
            Arc::new(BrokenStore),
        );

        let result = runner.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(CheckpointError::IoError(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let dir = tempdir().unwrap();
        let summary = runner(dir.path(), 2, 0, Arc::new(ScriptedTarget::default()))
            .await
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.attempted, 0);
    }
}
