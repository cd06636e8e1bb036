//! TTS Farm - 语音合成任务分发系统
//!
//! 同一个二进制按配置的 mode 运行为：
//! - server: 任务队列服务
//! - dispatcher: 轮询调度器
//! - batch: 批处理客户端
//!
//! 第一个命令行参数可覆盖配置中的 mode，例如 `ttsfarm dispatcher`；
//! batch 模式下其后的参数是要处理的字幕文件，例如 `ttsfarm batch ep1.srt ep2.srt`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use ttsfarm::application::ports::SynthesizerPort;
use ttsfarm::config::{load_config_with, print_config, AppConfig, ConfigError, RunMode, TtsEngine};
use ttsfarm::infrastructure::adapters::{
    FakeSynthesizer, HttpJobTarget, HttpSynthesizer, HttpSynthesizerConfig,
};
use ttsfarm::infrastructure::batch::{
    plan_sources, FileOutcome, SegmentSettings, SubtitleBatch, SubtitleRunReport,
};
use ttsfarm::infrastructure::dispatcher::{Dispatcher, DispatcherConfig};
use ttsfarm::infrastructure::http::{
    dispatcher_routes, queue_routes, DispatcherState, HttpServer, QueueState, RequestDefaults,
    ServerConfig,
};
use ttsfarm::infrastructure::queue::{JobQueue, JobQueueConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config_with(|config| apply_args(config, &args))
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "TTS Farm starting");
    print_config(&config);

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_ctrl_c(shutdown.clone()));

    match config.mode {
        RunMode::Server => run_server(&config, shutdown).await,
        RunMode::Dispatcher => run_dispatcher(&config, shutdown).await,
        RunMode::Batch => run_batch(&config, shutdown).await,
    }
}

/// 命令行：`[mode] [subtitle files...]`
fn apply_args(config: &mut AppConfig, args: &[String]) -> Result<(), ConfigError> {
    let Some((mode, files)) = args.split_first() else {
        return Ok(());
    };

    config.mode = RunMode::parse(mode).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "Unknown mode '{}', expected server|dispatcher|batch",
            mode
        ))
    })?;
    if !files.is_empty() {
        if config.mode != RunMode::Batch {
            return Err(ConfigError::ValidationError(
                "Subtitle file arguments are only accepted in batch mode".to_string(),
            ));
        }
        config.batch.subtitle_files = files.iter().map(Into::into).collect();
    }
    Ok(())
}

/// 初始化日志，RUST_LOG 优先于配置
fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},ttsfarm={},tower_http=info",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn listen_for_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
    }
    shutdown.cancel();
}

/// 任务队列服务
async fn run_server(config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let synthesizer: Arc<dyn SynthesizerPort> = match config.tts.engine {
        TtsEngine::Http => Arc::new(HttpSynthesizer::new(
            HttpSynthesizerConfig::new(&config.tts.url).with_timeout(config.tts.timeout_secs),
        )?),
        TtsEngine::Fake => Arc::new(FakeSynthesizer::with_defaults()),
    };

    let (queue, worker) = JobQueue::start(
        JobQueueConfig {
            capacity: config.queue.capacity,
            sync_timeout: Duration::from_secs(config.queue.sync_timeout_secs),
            result_ttl: Duration::from_secs(config.queue.result_ttl_secs),
        },
        synthesizer,
        shutdown.clone(),
    );

    let defaults = RequestDefaults {
        ref_audio: config.tts.default_ref_audio.clone(),
        ref_text: config.tts.default_ref_text.clone(),
        speed: config.tts.default_speed,
    };
    let routes = queue_routes(Arc::new(QueueState::new(queue, defaults)));

    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let result = HttpServer::new("queue", server_config, routes)
        .run_with_shutdown(shutdown.clone().cancelled_owned())
        .await;

    // 服务器因错误退出时也要停掉 worker
    shutdown.cancel();
    worker.await.context("Queue worker panicked")?;
    result?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 轮询调度器
async fn run_dispatcher(config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(DispatcherConfig {
        backends: config.dispatcher.backends.clone(),
        forward_timeout: Duration::from_secs(config.dispatcher.forward_timeout_secs),
        health_timeout: Duration::from_secs(config.dispatcher.health_timeout_secs),
        affinity_ttl: Duration::from_secs(config.dispatcher.affinity_ttl_secs),
    })?;

    let routes = dispatcher_routes(Arc::new(DispatcherState::new(Arc::new(dispatcher))));
    let server_config = ServerConfig::new(&config.server.host, config.server.port);

    HttpServer::new("dispatcher", server_config, routes)
        .run_with_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Dispatcher shutdown complete");
    Ok(())
}

/// 批处理客户端
///
/// 任一字幕文件未全部成功或运行被中断时返回错误，进程以非零状态退出
async fn run_batch(config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let batch = &config.batch;

    let sources = plan_sources(
        &batch.subtitle_files,
        &batch.output_dir,
        batch.checkpoint_file.as_deref(),
    );
    let settings = SegmentSettings {
        workers: batch.workers,
        ref_audio: batch.ref_audio.clone(),
        ref_text: batch.ref_text.clone(),
        speed: batch.speed,
    };
    let target = HttpJobTarget::new(&batch.target_url, batch.request_timeout_secs)?;

    let report = SubtitleBatch::new(sources, settings, Arc::new(target))
        .run(shutdown)
        .await?;

    log_report(&report);

    if report.interrupted {
        anyhow::bail!(
            "Batch interrupted with {} file(s) not started; re-run to resume",
            report.not_started.len()
        );
    }
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} subtitle file(s) failed; re-run to retry",
            report.failed().len(),
            report.files.len()
        );
    }
    Ok(())
}

/// 输出整个运行的汇总
fn log_report(report: &SubtitleRunReport) {
    let total = report.files.len() + report.not_started.len();
    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed().len(),
        not_started = report.not_started.len(),
        total = total,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "Batch run summary"
    );

    for file in report.failed() {
        match &file.outcome {
            FileOutcome::Processed(summary) => {
                for failure in &summary.failed {
                    tracing::error!(
                        file = %file.source.subtitle_file.display(),
                        index = failure.index,
                        error = %failure.error,
                        "Unresolved failure"
                    );
                }
                tracing::warn!(
                    file = %file.source.subtitle_file.display(),
                    completed = summary.completed_total,
                    total = summary.total,
                    checkpoint = %file.source.checkpoint_file.display(),
                    "Subtitle file incomplete, checkpoint kept"
                );
            }
            FileOutcome::Unreadable(error) => tracing::error!(
                file = %file.source.subtitle_file.display(),
                error = %error,
                "Subtitle file not processed"
            ),
        }
    }
}
