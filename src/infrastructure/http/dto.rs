//! Data Transfer Objects

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::application::JobError;
use crate::domain::{Job, JobOutcome, JobState, SynthesizedAudio};
use crate::infrastructure::queue::QueueStats;

// ============================================================================
// 请求
// ============================================================================

/// 请求缺省值（来自配置）
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDefaults {
    pub ref_audio: String,
    pub ref_text: String,
    pub speed: f32,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            ref_audio: String::new(),
            ref_text: String::new(),
            speed: 1.0,
        }
    }
}

/// `POST /tts` 和 `POST /tts/json` 的请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsRequest {
    pub text: Option<String>,
    pub ref_audio: Option<String>,
    pub ref_text: Option<String>,
    pub speed: Option<f32>,
    /// 异步模式：立即返回 request_id
    #[serde(rename = "async", default)]
    pub is_async: bool,
}

impl TtsRequest {
    /// 补全缺省值并创建任务；`text` 必填且不能为空白
    pub fn into_job(self, defaults: &RequestDefaults) -> Result<Job, JobError> {
        let text = self
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| JobError::bad_request("Missing 'text' field"))?;

        let speed = self.speed.unwrap_or(defaults.speed);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(JobError::bad_request(format!("Invalid 'speed': {}", speed)));
        }

        Ok(Job::new(
            text,
            self.ref_audio.unwrap_or_else(|| defaults.ref_audio.clone()),
            self.ref_text.unwrap_or_else(|| defaults.ref_text.clone()),
            speed,
        ))
    }
}

// ============================================================================
// 响应
// ============================================================================

/// 异步提交回执（202）
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub request_id: String,
    pub status: String,
    pub queue_position: usize,
}

/// 完成任务的音频结果
#[derive(Debug, Serialize)]
pub struct AudioResultDto {
    pub sample_rate: u32,
    pub duration: f64,
    pub audio_size: usize,
    pub audio_base64: String,
}

impl From<&SynthesizedAudio> for AudioResultDto {
    fn from(audio: &SynthesizedAudio) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            duration: audio.duration_secs(),
            audio_size: audio.audio_size(),
            audio_base64: STANDARD.encode(&audio.audio),
        }
    }
}

/// `GET /tts/status/:id` 响应
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: String,
    /// queued | in_progress | completed | failed | not_found
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AudioResultDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn pending(request_id: impl Into<String>, state: &JobState) -> Self {
        Self {
            request_id: request_id.into(),
            status: state.as_str(),
            result: None,
            error: None,
        }
    }

    pub fn finished(outcome: &JobOutcome) -> Self {
        let (result, error) = match &outcome.state {
            JobState::Completed(audio) => (Some(AudioResultDto::from(audio.as_ref())), None),
            JobState::Failed(error) => (None, Some(error.clone())),
            JobState::Queued | JobState::InProgress => (None, None),
        };

        Self {
            request_id: outcome.job.id.clone(),
            status: outcome.state.as_str(),
            result,
            error,
        }
    }

    pub fn not_found(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: "not_found",
            result: None,
            error: None,
        }
    }
}

/// `POST /tts/json` 响应
#[derive(Debug, Serialize)]
pub struct SynthesisJsonResponse {
    pub success: bool,
    pub request_id: String,
    pub sample_rate: u32,
    pub duration: f64,
    pub audio_size: usize,
    pub text: String,
}

/// 队列服务健康检查
#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub stats: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> RequestDefaults {
        RequestDefaults {
            ref_audio: "ref3.mp3".to_string(),
            ref_text: "default ref".to_string(),
            speed: 1.0,
        }
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let request: TtsRequest = serde_json::from_str(r#"{"text": "xin chao"}"#).unwrap();
        assert!(!request.is_async);

        let job = request.into_job(&defaults()).unwrap();
        assert_eq!(job.text, "xin chao");
        assert_eq!(job.ref_audio, "ref3.mp3");
        assert_eq!(job.ref_text, "default ref");
        assert_eq!(job.speed, 1.0);
    }

    #[test]
    fn test_explicit_fields_win() {
        let request: TtsRequest = serde_json::from_str(
            r#"{"text": "a", "ref_audio": "x.wav", "ref_text": "x", "speed": 0.75, "async": true}"#,
        )
        .unwrap();
        assert!(request.is_async);

        let job = request.into_job(&defaults()).unwrap();
        assert_eq!(job.ref_audio, "x.wav");
        assert_eq!(job.speed, 0.75);
    }

    #[test]
    fn test_missing_or_blank_text_rejected() {
        for body in [r#"{}"#, r#"{"text": "   "}"#] {
            let request: TtsRequest = serde_json::from_str(body).unwrap();
            assert!(matches!(
                request.into_job(&defaults()),
                Err(JobError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let request: TtsRequest = serde_json::from_str(r#"{"text": "a", "speed": 0}"#).unwrap();
        assert!(request.into_job(&defaults()).is_err());
    }
}
