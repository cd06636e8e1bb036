//! Queue Worker - 后台推理循环
//!
//! 唯一的消费者：按 FIFO 取出任务，在互斥锁下调用推理资源。
//! 推理报错（包括 panic）只记录为该任务失败，循环继续处理下一个任务。
//! 空闲时定期清理超过保留时间仍无人读取的结果。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SynthesisRequest, SynthesizerPort};
use crate::domain::JobState;

use super::exclusive::ExclusiveSynthesizer;
use super::job_queue::JobQueue;

/// 队列 Worker
pub struct QueueWorker {
    queue_receiver: mpsc::Receiver<String>,
    queue: Arc<JobQueue>,
    synthesizer: ExclusiveSynthesizer,
}

impl QueueWorker {
    pub fn new(
        queue_receiver: mpsc::Receiver<String>,
        queue: Arc<JobQueue>,
        synthesizer: Arc<dyn SynthesizerPort>,
    ) -> Self {
        Self {
            queue_receiver,
            queue,
            synthesizer: ExclusiveSynthesizer::new(synthesizer),
        }
    }

    /// 启动 Worker，直到收到关闭信号或所有发送端被释放
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("QueueWorker started");

        let sweep_period = (self.queue.result_ttl() / 4)
            .clamp(Duration::from_millis(100), Duration::from_secs(60));
        let mut sweep = tokio::time::interval(sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let request_id = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queue_receiver.recv() => match next {
                    Some(request_id) => request_id,
                    None => break,
                },
                _ = sweep.tick() => {
                    let expired = self.queue.sweep_expired(Utc::now());
                    if expired > 0 {
                        tracing::info!(expired = expired, "Dropped unclaimed job results");
                    }
                    continue;
                }
            };

            self.process(&request_id).await;
        }

        // 关闭队列，剩余任务标记为失败以唤醒等待方
        self.queue_receiver.close();
        let mut abandoned = 0usize;
        while let Some(request_id) = self.queue_receiver.recv().await {
            self.queue.abandon(&request_id);
            abandoned += 1;
        }

        tracing::info!(abandoned = abandoned, "QueueWorker stopped");
    }

    /// 处理单个任务
    async fn process(&self, request_id: &str) {
        let job = match self.queue.begin(request_id) {
            Some(job) => job,
            None => {
                tracing::warn!(request_id = %request_id, "Job record not found, skipping");
                return;
            }
        };

        tracing::info!(
            request_id = %request_id,
            text = %job.preview(),
            "Processing job"
        );

        let request = SynthesisRequest {
            text: job.text,
            ref_audio: job.ref_audio,
            ref_text: job.ref_text,
            speed: job.speed,
        };

        let started = Instant::now();
        let synthesizer = self.synthesizer.clone();
        // 独立 task 执行，panic 不会带走循环
        let result = tokio::spawn(async move { synthesizer.synthesize(request).await }).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let state = match result {
            Ok(Ok(audio)) => {
                tracing::info!(
                    request_id = %request_id,
                    elapsed_ms = elapsed_ms,
                    audio_size = audio.audio_size(),
                    duration_secs = audio.duration_secs(),
                    "Job completed"
                );
                JobState::Completed(Arc::new(audio))
            }
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, elapsed_ms = elapsed_ms, "Inference failed");
                JobState::Failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Inference task aborted");
                JobState::Failed(format!("Inference task aborted: {}", e))
            }
        };

        self.queue.finish(request_id, state);
    }
}
