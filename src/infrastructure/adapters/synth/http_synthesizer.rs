//! HTTP Synthesizer - 调用外部推理服务
//!
//! 外部推理 API:
//! POST {base_url}/api/tts/infer
//! Request: {"text", "ref_audio", "ref_text", "speed"} (JSON)
//! Response: audio/wav binary, metadata in headers

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::SynthesizedAudio;

/// 采样率缺失时的默认值
const DEFAULT_SAMPLE_RATE: u32 = 24_000;
/// 16-bit PCM WAV 头长度
const WAV_HEADER_LEN: usize = 44;

/// 推理请求体 (JSON)
#[derive(Debug, Serialize)]
struct InferHttpRequest<'a> {
    text: &'a str,
    ref_audio: &'a str,
    ref_text: &'a str,
    speed: f32,
}

/// HTTP Synthesizer 配置
#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    /// 推理服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpSynthesizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 300,
        }
    }
}

impl HttpSynthesizerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP Synthesizer
pub struct HttpSynthesizer {
    client: Client,
    config: HttpSynthesizerConfig,
}

impl HttpSynthesizer {
    pub fn new(config: HttpSynthesizerConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn infer_url(&self) -> String {
        format!("{}/api/tts/infer", self.config.base_url)
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// 从响应头推算样本数
///
/// 优先 `X-TTS-Sample-Count`，其次 `X-TTS-Duration-Ms`，
/// 都没有时按 16-bit 单声道 PCM 从字节长度推算
fn sample_count(headers: &HeaderMap, sample_rate: u32, audio_len: usize) -> u64 {
    if let Some(count) = header_number::<u64>(headers, "X-TTS-Sample-Count") {
        return count;
    }
    if let Some(ms) = header_number::<u64>(headers, "X-TTS-Duration-Ms") {
        return ms * u64::from(sample_rate) / 1000;
    }
    (audio_len.saturating_sub(WAV_HEADER_LEN) / 2) as u64
}

#[async_trait]
impl SynthesizerPort for HttpSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, SynthesisError> {
        let body = InferHttpRequest {
            text: &request.text,
            ref_audio: &request.ref_audio,
            ref_text: &request.ref_text,
            speed: request.speed,
        };

        tracing::debug!(
            url = %self.infer_url(),
            text_len = request.text.len(),
            ref_audio = %request.ref_audio,
            "Sending inference request"
        );

        let response = self
            .client
            .post(self.infer_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout
                } else if e.is_connect() {
                    SynthesisError::NetworkError(format!("Cannot connect to inference service: {}", e))
                } else {
                    SynthesisError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::InferenceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let headers = response.headers().clone();
        let sample_rate = header_number::<u32>(&headers, "X-TTS-Sample-Rate")
            .filter(|rate| *rate > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        if audio.is_empty() {
            return Err(SynthesisError::InvalidResponse("Empty audio body".to_string()));
        }

        let sample_count = sample_count(&headers, sample_rate, audio.len());

        Ok(SynthesizedAudio {
            audio,
            sample_rate,
            sample_count,
        })
    }
}
