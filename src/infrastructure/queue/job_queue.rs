//! Job Queue - 任务队列与结果表
//!
//! 接收并发提交，按提交顺序（FIFO）交给唯一的后台 worker。
//! 每个任务的状态通过 watch channel 发布，同步调用方在终态出现时被唤醒，
//! 不需要轮询。终态结果只交付一次，读取后从表中移除。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SynthesizerPort;
use crate::application::JobError;
use crate::domain::{Job, JobOutcome, JobState};

use super::worker::QueueWorker;

/// 队列配置
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// 队列容量
    pub capacity: usize,
    /// 同步模式最长等待时间
    pub sync_timeout: Duration,
    /// 终态结果无人读取时的保留时间，过期后由 worker 清理
    pub result_ttl: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            sync_timeout: Duration::from_secs(300),
            result_ttl: Duration::from_secs(3600),
        }
    }
}

/// 异步提交的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub request_id: String,
    /// 提交时在队列中的位置（从 1 开始）
    pub queue_position: usize,
}

/// 状态查询结果
#[derive(Debug, Clone)]
pub enum StatusLookup {
    /// 排队中或处理中
    Pending(JobState),
    /// 已结束，结果已从表中取出
    Finished(JobOutcome),
    /// 不存在或已被读取过
    NotFound,
}

/// 队列统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total_requests: u64,
    pub completed: u64,
    pub failed: u64,
    pub queue_depth: usize,
    pub in_progress: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    completed: u64,
    failed: u64,
}

struct JobRecord {
    job: Job,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: watch::Sender<JobState>,
}

/// 任务队列
pub struct JobQueue {
    config: JobQueueConfig,
    /// 任务队列发送端（job id）
    queue_sender: mpsc::Sender<String>,
    /// job id -> 记录
    records: DashMap<String, JobRecord>,
    /// 已入队但尚未被 worker 取出的数量
    queue_depth: AtomicUsize,
    in_progress: AtomicUsize,
    counters: Mutex<Counters>,
}

impl JobQueue {
    pub fn new(config: JobQueueConfig, queue_sender: mpsc::Sender<String>) -> Self {
        Self {
            config,
            queue_sender,
            records: DashMap::new(),
            queue_depth: AtomicUsize::new(0),
            in_progress: AtomicUsize::new(0),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// 创建队列并启动后台 worker
    pub fn start(
        config: JobQueueConfig,
        synthesizer: Arc<dyn SynthesizerPort>,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let queue = Arc::new(Self::new(config, tx));
        let worker = QueueWorker::new(rx, queue.clone(), synthesizer);
        let handle = tokio::spawn(worker.run(shutdown));
        (queue, handle)
    }

    pub fn sync_timeout(&self) -> Duration {
        self.config.sync_timeout
    }

    pub fn result_ttl(&self) -> Duration {
        self.config.result_ttl
    }

    /// 异步提交：立即返回排队回执
    pub fn submit(&self, job: Job) -> Result<SubmitReceipt, JobError> {
        if job.text.trim().is_empty() {
            return Err(JobError::bad_request("Missing 'text' field"));
        }

        let request_id = job.id.clone();
        let (state, _) = watch::channel(JobState::Queued);
        self.records.insert(
            request_id.clone(),
            JobRecord {
                job,
                submitted_at: Utc::now(),
                finished_at: None,
                state,
            },
        );

        let queue_position = self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_counters().total_requests += 1;

        if let Err(e) = self.queue_sender.try_send(request_id.clone()) {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            self.lock_counters().total_requests -= 1;
            self.records.remove(&request_id);
            tracing::warn!(request_id = %request_id, error = %e, "Failed to enqueue job");
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => JobError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => JobError::ShuttingDown,
            });
        }

        tracing::debug!(
            request_id = %request_id,
            queue_position = queue_position,
            "Job queued"
        );

        Ok(SubmitReceipt {
            request_id,
            queue_position,
        })
    }

    /// 同步提交：阻塞直到终态或超时
    ///
    /// 超时后任务保留在结果表中，可以通过 [`JobQueue::status`] 取回一次
    pub async fn submit_and_wait(&self, job: Job) -> Result<JobOutcome, JobError> {
        let receipt = self.submit(job)?;
        self.wait(&receipt.request_id, self.config.sync_timeout).await
    }

    /// 等待任务进入终态并取出结果
    pub async fn wait(&self, request_id: &str, timeout: Duration) -> Result<JobOutcome, JobError> {
        let mut state_rx = self
            .records
            .get(request_id)
            .map(|record| record.state.subscribe())
            .ok_or_else(|| JobError::bad_request(format!("Unknown request id: {}", request_id)))?;

        let finished = tokio::time::timeout(timeout, async {
            state_rx
                .wait_for(JobState::is_terminal)
                .await
                .map(|_| ())
        })
        .await;

        match finished {
            Ok(Ok(())) => self
                .take_finished(request_id)
                .ok_or_else(|| JobError::ResultGone(request_id.to_string())),
            Ok(Err(_)) => Err(JobError::ResultGone(request_id.to_string())),
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    waited_ms = timeout.as_millis() as u64,
                    "Sync wait timed out, result kept for later retrieval"
                );
                Err(JobError::Timeout {
                    request_id: request_id.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// 查询任务状态；终态结果在本次查询中交付并移除
    pub fn status(&self, request_id: &str) -> StatusLookup {
        let state = match self.records.get(request_id) {
            Some(record) => record.state.borrow().clone(),
            None => return StatusLookup::NotFound,
        };

        if state.is_terminal() {
            return self
                .take_finished(request_id)
                .map(StatusLookup::Finished)
                .unwrap_or(StatusLookup::NotFound);
        }
        StatusLookup::Pending(state)
    }

    /// 统计快照
    pub fn stats(&self) -> QueueStats {
        let counters = self.lock_counters();
        QueueStats {
            total_requests: counters.total_requests,
            completed: counters.completed,
            failed: counters.failed,
            queue_depth: self.queue_depth.load(Ordering::SeqCst),
            in_progress: self.in_progress.load(Ordering::SeqCst),
        }
    }

    // ========== worker 侧 ==========

    /// worker 取出任务：出队并标记为处理中
    pub(super) fn begin(&self, request_id: &str) -> Option<Job> {
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
        let record = self.records.get(request_id)?;
        record.state.send_replace(JobState::InProgress);
        self.in_progress.fetch_add(1, Ordering::SeqCst);
        Some(record.job.clone())
    }

    /// worker 写入终态
    pub(super) fn finish(&self, request_id: &str, state: JobState) {
        self.in_progress.fetch_sub(1, Ordering::SeqCst);
        {
            let mut counters = self.lock_counters();
            match &state {
                JobState::Completed(_) => counters.completed += 1,
                _ => counters.failed += 1,
            }
        }
        if let Some(mut record) = self.records.get_mut(request_id) {
            record.finished_at = Some(Utc::now());
            record.state.send_replace(state);
        }
    }

    /// 关闭时仍在队列中的任务：出队并标记失败，唤醒等待方
    pub(super) fn abandon(&self, request_id: &str) {
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
        self.lock_counters().failed += 1;
        if let Some(mut record) = self.records.get_mut(request_id) {
            record.finished_at = Some(Utc::now());
            record
                .state
                .send_replace(JobState::Failed("Job queue shut down".to_string()));
        }
    }

    /// 移除结束时间早于 `now - result_ttl` 的终态记录，返回移除数量
    ///
    /// 排队中和处理中的任务不受影响
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = match chrono::Duration::from_std(self.config.result_ttl) {
            Ok(ttl) => ttl,
            Err(_) => return 0,
        };
        let before = self.records.len();
        self.records.retain(|_, record| match record.finished_at {
            Some(finished_at) => now - finished_at < ttl,
            None => true,
        });
        before.saturating_sub(self.records.len())
    }

    fn take_finished(&self, request_id: &str) -> Option<JobOutcome> {
        self.records
            .remove_if(request_id, |_, record| record.state.borrow().is_terminal())
            .map(|(_, record)| {
                let state = record.state.borrow().clone();
                JobOutcome {
                    state,
                    job: record.job,
                    submitted_at: record.submitted_at,
                    finished_at: record.finished_at,
                }
            })
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
