//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

/// 运行角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 任务队列服务（独占一个推理资源）
    #[default]
    Server,
    /// 轮询调度器
    Dispatcher,
    /// 批处理客户端
    Batch,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Server => "server",
            RunMode::Dispatcher => "dispatcher",
            RunMode::Batch => "batch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "server" => Some(RunMode::Server),
            "dispatcher" => Some(RunMode::Dispatcher),
            "batch" => Some(RunMode::Batch),
            _ => None,
        }
    }
}

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 运行角色
    #[serde(default)]
    pub mode: RunMode,

    /// 服务器监听配置（队列服务与调度器共用）
    #[serde(default)]
    pub server: ServerConfig,

    /// 任务队列配置
    #[serde(default)]
    pub queue: QueueConfig,

    /// 推理引擎配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 调度器配置
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// 批处理配置
    #[serde(default)]
    pub batch: BatchConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 任务队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// 队列容量，满时拒绝新任务
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// 同步模式最长等待时间（秒）
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,

    /// 终态结果无人读取时的保留时间（秒）
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_sync_timeout() -> u64 {
    300
}

pub(super) fn default_result_ttl() -> u64 {
    3600
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            sync_timeout_secs: default_sync_timeout(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

/// 推理引擎类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// 调用外部推理服务
    #[default]
    Http,
    /// 生成静音 WAV（演示/测试）
    Fake,
}

/// 推理引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub engine: TtsEngine,

    /// 推理服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 推理超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// 请求未指定时使用的参考音频
    #[serde(default = "default_ref_audio")]
    pub default_ref_audio: String,

    /// 请求未指定时使用的参考文本
    #[serde(default)]
    pub default_ref_text: String,

    /// 请求未指定时使用的语速
    #[serde(default = "default_speed")]
    pub default_speed: f32,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    300
}

fn default_ref_audio() -> String {
    "ref.wav".to_string()
}

fn default_speed() -> f32 {
    1.0
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
            default_ref_audio: default_ref_audio(),
            default_ref_text: String::new(),
            default_speed: default_speed(),
        }
    }
}

/// 调度器配置
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// 后端队列服务列表
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,

    /// 转发超时（秒）
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,

    /// 健康探测超时（秒）
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// 未被查询的任务路由记录保留时间（秒）
    #[serde(default = "default_result_ttl")]
    pub affinity_ttl_secs: u64,
}

pub(super) fn default_backends() -> Vec<String> {
    vec![
        "http://localhost:5000".to_string(),
        "http://localhost:5001".to_string(),
        "http://localhost:5002".to_string(),
    ]
}

fn default_forward_timeout() -> u64 {
    120
}

fn default_health_timeout() -> u64 {
    2
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            forward_timeout_secs: default_forward_timeout(),
            health_timeout_secs: default_health_timeout(),
            affinity_ttl_secs: default_result_ttl(),
        }
    }
}

/// 批处理配置
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// SRT 字幕文件，按顺序逐个处理
    #[serde(default)]
    pub subtitle_files: Vec<PathBuf>,

    /// 音频输出目录
    ///
    /// 多个字幕文件时每个文件输出到 `<output_dir>/<文件名>/`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// 检查点文件，只用于单个字幕文件；
    /// 未设置时为输出目录下的 `.checkpoint.json`
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,

    /// 参考音频，未设置时使用服务端默认值
    #[serde(default)]
    pub ref_audio: Option<String>,

    /// 参考文本，未设置时使用服务端默认值
    #[serde(default)]
    pub ref_text: Option<String>,

    /// 提交目标（队列服务或调度器）
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// 并发 worker 数量
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// 语速
    #[serde(default = "default_batch_speed")]
    pub speed: f32,

    /// 单个任务的请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output_audio")
}

fn default_target_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_batch_speed() -> f32 {
    0.75
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            subtitle_files: Vec::new(),
            output_dir: default_output_dir(),
            checkpoint_file: None,
            ref_audio: None,
            ref_text: None,
            target_url: default_target_url(),
            workers: default_workers(),
            speed: default_batch_speed(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.mode, RunMode::Server);
        assert_eq!(config.server.addr(), "0.0.0.0:5000");
        assert_eq!(config.queue.sync_timeout_secs, 300);
        assert_eq!(config.dispatcher.backends.len(), 3);
        assert_eq!(config.batch.workers, 2);
    }

    #[test]
    fn test_batch_voice_defers_to_server() {
        let batch = BatchConfig::default();
        assert!(batch.subtitle_files.is_empty());
        assert!(batch.ref_audio.is_none());
        assert!(batch.ref_text.is_none());
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!(RunMode::parse("Dispatcher"), Some(RunMode::Dispatcher));
        assert_eq!(RunMode::parse(" batch "), Some(RunMode::Batch));
        assert_eq!(RunMode::parse("proxy"), None);
    }
}
