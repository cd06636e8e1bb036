//! HTTP Job Target - 把批处理任务提交到队列服务或调度器
//!
//! POST {base_url}/tts (同步模式)
//! Request: {"text", "ref_audio"?, "ref_text"?, "speed"} (JSON)
//! Response: audio/wav binary
//!
//! 未设置的参考音频/文本不发送，服务端使用自己的默认值

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{JobTargetPort, TargetError};
use crate::domain::SegmentJob;

/// 提交请求体
#[derive(Debug, Serialize)]
struct SubmitHttpRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_audio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_text: Option<&'a str>,
    speed: f32,
}

/// HTTP Job Target
pub struct HttpJobTarget {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpJobTarget {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, TargetError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TargetError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    fn submit_url(&self) -> String {
        format!("{}/tts", self.base_url)
    }
}

#[async_trait]
impl JobTargetPort for HttpJobTarget {
    async fn submit(&self, job: &SegmentJob) -> Result<Vec<u8>, TargetError> {
        let body = SubmitHttpRequest {
            text: &job.text,
            ref_audio: job.ref_audio.as_deref(),
            ref_text: job.ref_text.as_deref(),
            speed: job.speed,
        };

        let response = self
            .client
            .post(self.submit_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TargetError::Timeout(self.timeout_secs)
                } else {
                    TargetError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TargetError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TargetError::Timeout(self.timeout_secs)
                } else {
                    TargetError::InvalidResponse(format!("Failed to read audio: {}", e))
                }
            })?
            .to_vec();

        if audio.is_empty() {
            return Err(TargetError::InvalidResponse("Empty audio body".to_string()));
        }

        Ok(audio)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
