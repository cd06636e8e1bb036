//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::types::{default_backends, AppConfig, RunMode, TtsEngine};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "TTSFARM";

/// 加载应用配置
///
/// # 环境变量示例
/// - `TTSFARM_MODE=dispatcher`
/// - `TTSFARM_SERVER__PORT=5001`
/// - `TTSFARM_TTS__ENGINE=fake`
/// - `TTSFARM_DISPATCHER__BACKENDS=http://gpu1:5000,http://gpu2:5000`
/// - `TTSFARM_BATCH__SUBTITLE_FILES=episode01.srt,episode02.srt`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_with(|_| Ok(()))
}

/// 加载应用配置，验证前先应用命令行覆盖
///
/// 配置文件搜索当前目录下的 config.toml / config.local.toml
pub fn load_config_with<F>(overrides: F) -> Result<AppConfig, ConfigError>
where
    F: FnOnce(&mut AppConfig) -> Result<(), ConfigError>,
{
    let mut config = read_with_env(None, environment())?;
    overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// 环境变量来源
///
/// 层级分隔符 `__`，`dispatcher.backends` 和 `batch.subtitle_files` 按逗号拆分为列表
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("dispatcher.backends")
        .with_list_parse_key("batch.subtitle_files")
        .try_parsing(true)
}

#[cfg(test)]
fn load_with_env(config_path: Option<&Path>, env: Environment) -> Result<AppConfig, ConfigError> {
    let config = read_with_env(config_path, env)?;
    validate_config(&config)?;
    Ok(config)
}

/// 合并所有来源，不做验证
fn read_with_env(config_path: Option<&Path>, env: Environment) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("mode", "server")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5000)?
        .set_default("queue.capacity", 1000)?
        .set_default("queue.sync_timeout_secs", 300)?
        .set_default("queue.result_ttl_secs", 3600)?
        .set_default("tts.engine", "http")?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 300)?
        .set_default("tts.default_ref_audio", "ref.wav")?
        .set_default("tts.default_ref_text", "")?
        .set_default("tts.default_speed", 1.0)?
        .set_default("dispatcher.backends", default_backends())?
        .set_default("dispatcher.forward_timeout_secs", 120)?
        .set_default("dispatcher.health_timeout_secs", 2)?
        .set_default("dispatcher.affinity_ttl_secs", 3600)?
        .set_default("batch.output_dir", "output_audio")?
        .set_default("batch.target_url", "http://localhost:8080")?
        .set_default("batch.workers", 2)?
        .set_default("batch.speed", 0.75)?
        .set_default("batch.request_timeout_secs", 120)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    builder = builder.add_source(env);

    let config = builder.build()?;

    config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
///
/// 只检查当前运行角色会用到的部分
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    match config.mode {
        RunMode::Server => {
            if config.server.port == 0 {
                return Err(invalid("Server port cannot be 0"));
            }
            if config.queue.capacity == 0 {
                return Err(invalid("Queue capacity cannot be 0"));
            }
            if config.queue.sync_timeout_secs == 0 {
                return Err(invalid("Sync timeout cannot be 0"));
            }
            if config.queue.result_ttl_secs == 0 {
                return Err(invalid("Result TTL cannot be 0"));
            }
            if config.tts.engine == TtsEngine::Http && config.tts.url.trim().is_empty() {
                return Err(invalid("TTS URL cannot be empty when engine is http"));
            }
            if config.tts.timeout_secs == 0 {
                return Err(invalid("TTS timeout cannot be 0"));
            }
            if !(config.tts.default_speed > 0.0) {
                return Err(invalid("Default speed must be positive"));
            }
        }
        RunMode::Dispatcher => {
            if config.server.port == 0 {
                return Err(invalid("Server port cannot be 0"));
            }
            let backends = &config.dispatcher.backends;
            if backends.is_empty() {
                return Err(invalid("Dispatcher needs at least one backend"));
            }
            let mut seen = HashSet::new();
            for backend in backends {
                let normalized = backend.trim().trim_end_matches('/');
                if normalized.is_empty() {
                    return Err(invalid("Backend URL cannot be empty"));
                }
                if !seen.insert(normalized.to_string()) {
                    return Err(invalid(format!("Duplicate backend: {}", normalized)));
                }
            }
            if config.dispatcher.forward_timeout_secs == 0
                || config.dispatcher.health_timeout_secs == 0
                || config.dispatcher.affinity_ttl_secs == 0
            {
                return Err(invalid("Dispatcher timeouts cannot be 0"));
            }
        }
        RunMode::Batch => {
            let files = &config.batch.subtitle_files;
            if files.is_empty() || files.iter().any(|f| f.as_os_str().is_empty()) {
                return Err(invalid("Batch subtitle_files must be set"));
            }
            if files.len() > 1 {
                if config.batch.checkpoint_file.is_some() {
                    return Err(invalid(
                        "Batch checkpoint_file only applies to a single subtitle file",
                    ));
                }
                let mut stems = HashSet::new();
                for file in files {
                    let stem = file.file_stem().unwrap_or(file.as_os_str());
                    if !stems.insert(stem.to_os_string()) {
                        return Err(invalid(format!(
                            "Subtitle files share the output name {:?}",
                            stem
                        )));
                    }
                }
            }
            if config.batch.target_url.trim().is_empty() {
                return Err(invalid("Batch target_url cannot be empty"));
            }
            if config.batch.workers == 0 {
                return Err(invalid("Batch workers cannot be 0"));
            }
            if config.batch.request_timeout_secs == 0 {
                return Err(invalid("Batch request timeout cannot be 0"));
            }
            if !(config.batch.speed > 0.0) {
                return Err(invalid("Batch speed must be positive"));
            }
        }
    }

    Ok(())
}

/// 超时组合上的隐患
///
/// 调度器的转发超时不长于后端的同步等待时间时，同步请求会先在调度器
/// 超时（502），拿不到后端返回的 request_id，结果也就无法再取回
pub fn timeout_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.mode == RunMode::Dispatcher
        && config.dispatcher.forward_timeout_secs <= config.queue.sync_timeout_secs
    {
        warnings.push(format!(
            "Forward timeout ({}s) does not exceed backend sync timeout ({}s); \
             long sync requests fail with 502 before the backend reports a request id, \
             use async mode or raise dispatcher.forward_timeout_secs",
            config.dispatcher.forward_timeout_secs, config.queue.sync_timeout_secs
        ));
    }
    if config.mode == RunMode::Batch
        && config.batch.request_timeout_secs <= config.queue.sync_timeout_secs
    {
        warnings.push(format!(
            "Batch request timeout ({}s) does not exceed backend sync timeout ({}s); \
             slow segments are recorded as failed and retried on the next run",
            config.batch.request_timeout_secs, config.queue.sync_timeout_secs
        ));
    }
    warnings
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Mode: {}", config.mode.as_str());
    match config.mode {
        RunMode::Server => {
            tracing::info!("Server: {}", config.server.addr());
            tracing::info!("Queue Capacity: {}", config.queue.capacity);
            tracing::info!("Sync Timeout: {}s", config.queue.sync_timeout_secs);
            tracing::info!("Result TTL: {}s", config.queue.result_ttl_secs);
            tracing::info!("TTS Engine: {:?}", config.tts.engine);
            if config.tts.engine == TtsEngine::Http {
                tracing::info!("TTS URL: {}", config.tts.url);
                tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
            }
            tracing::info!("Default Ref Audio: {}", config.tts.default_ref_audio);
            tracing::info!("Default Speed: {}", config.tts.default_speed);
        }
        RunMode::Dispatcher => {
            tracing::info!("Server: {}", config.server.addr());
            for (i, backend) in config.dispatcher.backends.iter().enumerate() {
                tracing::info!("Backend {}: {}", i + 1, backend);
            }
            tracing::info!("Forward Timeout: {}s", config.dispatcher.forward_timeout_secs);
            tracing::info!("Health Timeout: {}s", config.dispatcher.health_timeout_secs);
            tracing::info!("Affinity TTL: {}s", config.dispatcher.affinity_ttl_secs);
        }
        RunMode::Batch => {
            for (i, file) in config.batch.subtitle_files.iter().enumerate() {
                tracing::info!("Subtitle File {}: {:?}", i + 1, file);
            }
            tracing::info!("Output Directory: {:?}", config.batch.output_dir);
            if let Some(checkpoint) = &config.batch.checkpoint_file {
                tracing::info!("Checkpoint: {:?}", checkpoint);
            }
            tracing::info!(
                "Ref Audio: {}",
                config.batch.ref_audio.as_deref().unwrap_or("(server default)")
            );
            tracing::info!("Target: {}", config.batch.target_url);
            tracing::info!("Workers: {}", config.batch.workers);
            tracing::info!("Speed: {}", config.batch.speed);
        }
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
    for warning in timeout_warnings(config) {
        tracing::warn!("{}", warning);
    }
}
