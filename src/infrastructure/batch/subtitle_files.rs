//! Subtitle Files - 一次运行处理多个字幕文件
//!
//! 文件按顺序逐个处理，每个文件有自己的输出目录和检查点，互不影响：
//! 单个文件时直接输出到 `output_dir`，多个文件时输出到 `output_dir/<文件名>/`。
//! 某个文件读取失败或仍有失败片段只记录在报告里，继续处理下一个文件；
//! 中断和检查点写入失败会停止整个运行。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::application::ports::{CheckpointError, JobTargetPort};
use crate::domain::extract_segments;
use crate::infrastructure::adapters::FileSegmentStorage;
use crate::infrastructure::persistence::FileCheckpointStore;

use super::worker_pool::{build_jobs, BatchRunner, BatchSummary};

const CHECKPOINT_FILE_NAME: &str = ".checkpoint.json";

/// 单个字幕文件的输入输出位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleSource {
    pub subtitle_file: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_file: PathBuf,
}

/// 规划每个字幕文件的输出目录和检查点
///
/// `checkpoint_file` 只对单个文件生效
pub fn plan_sources(
    subtitle_files: &[PathBuf],
    output_dir: &Path,
    checkpoint_file: Option<&Path>,
) -> Vec<SubtitleSource> {
    if let [single] = subtitle_files {
        return vec![SubtitleSource {
            subtitle_file: single.clone(),
            output_dir: output_dir.to_path_buf(),
            checkpoint_file: checkpoint_file
                .map(Path::to_path_buf)
                .unwrap_or_else(|| output_dir.join(CHECKPOINT_FILE_NAME)),
        }];
    }

    subtitle_files
        .iter()
        .map(|file| {
            let stem = file.file_stem().unwrap_or(file.as_os_str());
            let dir = output_dir.join(stem);
            SubtitleSource {
                subtitle_file: file.clone(),
                checkpoint_file: dir.join(CHECKPOINT_FILE_NAME),
                output_dir: dir,
            }
        })
        .collect()
}

/// 批次中每个片段共用的请求参数
#[derive(Debug, Clone)]
pub struct SegmentSettings {
    pub workers: usize,
    pub ref_audio: Option<String>,
    pub ref_text: Option<String>,
    pub speed: f32,
}

/// 单个文件的处理结果
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// 批次跑完（可能仍有失败片段）
    Processed(BatchSummary),
    /// 文件没能开始处理
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: SubtitleSource,
    pub outcome: FileOutcome,
    pub elapsed: Duration,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, FileOutcome::Processed(summary) if summary.is_success())
    }
}

/// 整个运行的汇总
#[derive(Debug, Clone)]
pub struct SubtitleRunReport {
    pub files: Vec<FileReport>,
    /// 因中断没有开始的文件
    pub not_started: Vec<PathBuf>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl SubtitleRunReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> Vec<&FileReport> {
        self.files.iter().filter(|f| !f.is_success()).collect()
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.not_started.is_empty() && self.failed().is_empty()
    }
}

/// 多文件批处理
pub struct SubtitleBatch {
    sources: Vec<SubtitleSource>,
    settings: SegmentSettings,
    target: Arc<dyn JobTargetPort>,
}

impl SubtitleBatch {
    pub fn new(
        sources: Vec<SubtitleSource>,
        settings: SegmentSettings,
        target: Arc<dyn JobTargetPort>,
    ) -> Self {
        Self {
            sources,
            settings,
            target,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<SubtitleRunReport, CheckpointError> {
        let started = Instant::now();
        let file_count = self.sources.len();
        let mut files = Vec::with_capacity(file_count);
        let mut interrupted = false;
        let mut pending = VecDeque::from(self.sources);

        tracing::info!(files = file_count, "Subtitle batch starting");

        while let Some(source) = pending.pop_front() {
            if shutdown.is_cancelled() {
                interrupted = true;
                pending.push_front(source);
                break;
            }
            let position = files.len() + 1;

            tracing::info!(
                file = %source.subtitle_file.display(),
                output_dir = %source.output_dir.display(),
                position = position,
                total = file_count,
                "Processing subtitle file"
            );

            let file_started = Instant::now();
            let outcome =
                Self::run_file(&source, &self.settings, self.target.clone(), shutdown.clone())
                    .await?;
            let elapsed = file_started.elapsed();

            match &outcome {
                FileOutcome::Processed(summary) if summary.is_success() => tracing::info!(
                    file = %source.subtitle_file.display(),
                    segments = summary.total,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Subtitle file finished"
                ),
                FileOutcome::Processed(summary) => tracing::warn!(
                    file = %source.subtitle_file.display(),
                    completed = summary.completed_total,
                    failed = summary.failed.len(),
                    total = summary.total,
                    "Subtitle file incomplete"
                ),
                FileOutcome::Unreadable(error) => tracing::error!(
                    file = %source.subtitle_file.display(),
                    error = %error,
                    "Subtitle file skipped"
                ),
            }

            let stop = matches!(&outcome, FileOutcome::Processed(summary) if summary.interrupted);
            files.push(FileReport {
                source,
                outcome,
                elapsed,
            });
            if stop {
                interrupted = true;
                break;
            }
        }

        Ok(SubtitleRunReport {
            files,
            not_started: pending.into_iter().map(|source| source.subtitle_file).collect(),
            interrupted,
            elapsed: started.elapsed(),
        })
    }

    async fn run_file(
        source: &SubtitleSource,
        settings: &SegmentSettings,
        target: Arc<dyn JobTargetPort>,
        shutdown: CancellationToken,
    ) -> Result<FileOutcome, CheckpointError> {
        let content = match tokio::fs::read_to_string(&source.subtitle_file).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(FileOutcome::Unreadable(format!(
                    "Failed to read {}: {}",
                    source.subtitle_file.display(),
                    e
                )))
            }
        };

        let segments = extract_segments(&content);
        if segments.is_empty() {
            return Ok(FileOutcome::Unreadable(format!(
                "No text segments found in {}",
                source.subtitle_file.display()
            )));
        }
        tracing::info!(segments = segments.len(), "Subtitle segments extracted");

        let storage = match FileSegmentStorage::new(&source.output_dir).await {
            Ok(storage) => storage,
            Err(e) => return Ok(FileOutcome::Unreadable(e.to_string())),
        };

        let jobs = build_jobs(
            segments,
            settings.ref_audio.as_deref(),
            settings.ref_text.as_deref(),
            settings.speed,
        );

        let summary = BatchRunner::new(
            settings.workers,
            jobs,
            target,
            Arc::new(storage),
            Arc::new(FileCheckpointStore::new(&source.checkpoint_file)),
        )
        .run(shutdown)
        .await?;

        Ok(FileOutcome::Processed(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TargetError;
    use crate::domain::SegmentJob;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// 文本含 "broken" 的片段失败，其余返回文本字节
    #[derive(Default)]
    struct EchoTarget {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobTargetPort for EchoTarget {
        async fn submit(&self, job: &SegmentJob) -> Result<Vec<u8>, TargetError> {
            self.texts.lock().unwrap().push(job.text.clone());
            if job.text.contains("broken") {
                return Err(TargetError::HttpStatus {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(job.text.clone().into_bytes())
        }

        fn describe(&self) -> String {
            "echo".to_string()
        }
    }

    fn settings() -> SegmentSettings {
        SegmentSettings {
            workers: 2,
            ref_audio: None,
            ref_text: None,
            speed: 0.75,
        }
    }

    fn write_srt(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let mut content = String::new();
        for (i, line) in lines.iter().enumerate() {
            content.push_str(&format!(
                "{}\n00:00:0{},000 --> 00:00:0{},500\n{}\n\n",
                i + 1,
                i,
                i,
                line
            ));
        }
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_single_file_uses_output_dir() {
        let sources = plan_sources(&[PathBuf::from("subs/ep1.srt")], Path::new("out"), None);
        assert_eq!(
            sources,
            vec![SubtitleSource {
                subtitle_file: PathBuf::from("subs/ep1.srt"),
                output_dir: PathBuf::from("out"),
                checkpoint_file: PathBuf::from("out/.checkpoint.json"),
            }]
        );

        let sources = plan_sources(
            &[PathBuf::from("ep1.srt")],
            Path::new("out"),
            Some(Path::new("/tmp/run.json")),
        );
        assert_eq!(sources[0].checkpoint_file, PathBuf::from("/tmp/run.json"));
    }

    #[test]
    fn test_multiple_files_get_own_directories() {
        let sources = plan_sources(
            &[PathBuf::from("a/ep1.srt"), PathBuf::from("b/ep2.srt")],
            Path::new("out"),
            None,
        );
        assert_eq!(sources[0].output_dir, PathBuf::from("out/ep1"));
        assert_eq!(sources[1].output_dir, PathBuf::from("out/ep2"));
        assert_eq!(
            sources[1].checkpoint_file,
            PathBuf::from("out/ep2/.checkpoint.json")
        );
    }

    #[tokio::test]
    async fn test_every_file_is_processed_into_its_directory() {
        let dir = tempdir().unwrap();
        let ep1 = write_srt(dir.path(), "ep1.srt", &["một", "hai"]);
        let ep2 = write_srt(dir.path(), "ep2.srt", &["ba"]);
        let out = dir.path().join("out");

        let report = SubtitleBatch::new(
            plan_sources(&[ep1, ep2], &out, None),
            settings(),
            Arc::new(EchoTarget::default()),
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded(), 2);
        assert_eq!(std::fs::read(out.join("ep1/audio_0001.wav")).unwrap(), "hai".as_bytes());
        assert_eq!(std::fs::read(out.join("ep2/audio_0000.wav")).unwrap(), "ba".as_bytes());
        assert!(!out.join("ep1/.checkpoint.json").exists());
        assert!(!out.join("ep2/.checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_bad_file_does_not_stop_the_others() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.srt");
        let broken = write_srt(dir.path(), "broken.srt", &["ok", "broken line"]);
        let good = write_srt(dir.path(), "good.srt", &["fine"]);
        let out = dir.path().join("out");

        let target = Arc::new(EchoTarget::default());
        let report = SubtitleBatch::new(
            plan_sources(&[missing.clone(), broken, good], &out, None),
            settings(),
            target.clone(),
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        assert!(!report.is_success());
        assert!(!report.interrupted);
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.succeeded(), 1);

        let failed = report.failed();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].source.subtitle_file, missing);
        assert!(matches!(failed[0].outcome, FileOutcome::Unreadable(_)));
        match &failed[1].outcome {
            FileOutcome::Processed(summary) => {
                assert_eq!(summary.failed.len(), 1);
                assert_eq!(summary.failed[0].index, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // 未完成的文件保留检查点
        assert!(out.join("broken/.checkpoint.json").exists());
        assert!(out.join("good/audio_0000.wav").exists());
    }

    #[tokio::test]
    async fn test_interrupt_leaves_remaining_files() {
        let dir = tempdir().unwrap();
        let ep1 = write_srt(dir.path(), "ep1.srt", &["một"]);
        let ep2 = write_srt(dir.path(), "ep2.srt", &["hai"]);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let target = Arc::new(EchoTarget::default());
        let report = SubtitleBatch::new(
            plan_sources(&[ep1.clone(), ep2.clone()], &dir.path().join("out"), None),
            settings(),
            target.clone(),
        )
        .run(shutdown)
        .await
        .unwrap();

        assert!(report.interrupted);
        assert!(!report.is_success());
        assert!(report.files.is_empty());
        assert_eq!(report.not_started, vec![ep1, ep2]);
        assert!(target.texts.lock().unwrap().is_empty());
    }
}
