//! Fake Synthesizer - 不依赖推理服务的合成器
//!
//! 生成静音 WAV，时长按文本长度估算，用于演示和测试

use async_trait::async_trait;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::SynthesizedAudio;

/// Fake Synthesizer 配置
#[derive(Debug, Clone)]
pub struct FakeSynthesizerConfig {
    pub sample_rate: u32,
    /// 每个字符对应的时长（毫秒，按语速 1.0 计）
    pub ms_per_char: u64,
    /// 模拟推理延迟
    pub latency: Duration,
}

impl Default for FakeSynthesizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            ms_per_char: 80,
            latency: Duration::from_millis(200),
        }
    }
}

/// Fake Synthesizer
pub struct FakeSynthesizer {
    config: FakeSynthesizerConfig,
}

impl FakeSynthesizer {
    pub fn new(config: FakeSynthesizerConfig) -> Self {
        tracing::info!(
            sample_rate = config.sample_rate,
            latency_ms = config.latency.as_millis() as u64,
            "FakeSynthesizer initialized"
        );
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeSynthesizerConfig::default())
    }

    fn sample_count(&self, request: &SynthesisRequest) -> u64 {
        let chars = request.text.chars().count() as f64;
        let speed = if request.speed > 0.0 { f64::from(request.speed) } else { 1.0 };
        let millis = chars * self.config.ms_per_char as f64 / speed;
        (millis * f64::from(self.config.sample_rate) / 1000.0).round() as u64
    }
}

/// 16-bit 单声道 PCM 静音 WAV
pub fn silent_wav(sample_rate: u32, sample_count: u64) -> Vec<u8> {
    let data_len = (sample_count * 2) as u32;
    let byte_rate = sample_rate * 2;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

#[async_trait]
impl SynthesizerPort for FakeSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, SynthesisError> {
        tracing::debug!(
            text_len = request.text.len(),
            ref_audio = %request.ref_audio,
            "FakeSynthesizer: returning silent audio"
        );

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let sample_count = self.sample_count(&request);
        Ok(SynthesizedAudio {
            audio: silent_wav(self.config.sample_rate, sample_count),
            sample_rate: self.config.sample_rate,
            sample_count,
        })
    }
}
