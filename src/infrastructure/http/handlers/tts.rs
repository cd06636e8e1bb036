//! TTS Handlers - 队列服务
//!
//! - `POST /tts`            同步返回 audio/wav，`async: true` 时返回 202
//! - `POST /tts/json`       同步执行，只返回元数据
//! - `GET  /tts/status/:id` 查询异步任务，终态结果只交付一次

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::application::JobError;
use crate::domain::{JobOutcome, JobState, SynthesizedAudio};
use crate::infrastructure::http::dto::{
    QueuedResponse, StatusResponse, SynthesisJsonResponse, TtsRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::QueueState;
use crate::infrastructure::queue::StatusLookup;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_SAMPLE_RATE: HeaderName = HeaderName::from_static("x-sample-rate");
pub const X_DURATION_SECS: HeaderName = HeaderName::from_static("x-duration-secs");

/// 从终态中取出音频，失败转为错误
fn completed_audio(outcome: JobOutcome) -> Result<(String, Arc<SynthesizedAudio>), ApiError> {
    match outcome.state {
        JobState::Completed(audio) => Ok((outcome.job.id, audio)),
        JobState::Failed(error) => Err(JobError::InferenceFailure(error).into()),
        state => Err(ApiError::Internal(format!(
            "Job {} returned in non-terminal state {}",
            outcome.job.id,
            state.as_str()
        ))),
    }
}

fn header_value(value: impl ToString) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&value.to_string()).map_err(|e| ApiError::Internal(e.to_string()))
}

fn audio_response(request_id: &str, audio: Arc<SynthesizedAudio>) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(format!("attachment; filename=\"{}.wav\"", request_id))?,
    );
    headers.insert(X_REQUEST_ID, header_value(request_id)?);
    headers.insert(X_SAMPLE_RATE, header_value(audio.sample_rate)?);
    headers.insert(X_DURATION_SECS, header_value(format!("{:.3}", audio.duration_secs()))?);

    let body = Arc::try_unwrap(audio)
        .map(|audio| audio.audio)
        .unwrap_or_else(|shared| shared.audio.clone());

    Ok((headers, body).into_response())
}

/// `POST /tts`
pub async fn submit_tts(
    State(state): State<Arc<QueueState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let is_async = request.is_async;
    let job = request.into_job(&state.defaults)?;

    if is_async {
        let receipt = state.queue.submit(job)?;
        tracing::info!(
            request_id = %receipt.request_id,
            queue_position = receipt.queue_position,
            "Async job accepted"
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                request_id: receipt.request_id,
                status: "queued".to_string(),
                queue_position: receipt.queue_position,
            }),
        )
            .into_response());
    }

    let outcome = state.queue.submit_and_wait(job).await?;
    let (request_id, audio) = completed_audio(outcome)?;
    audio_response(&request_id, audio)
}

/// `POST /tts/json`
pub async fn submit_tts_json(
    State(state): State<Arc<QueueState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Json<SynthesisJsonResponse>, ApiError> {
    let Json(request) = payload?;
    let job = request.into_job(&state.defaults)?;
    let text = job.text.clone();

    let outcome = state.queue.submit_and_wait(job).await?;
    let (request_id, audio) = completed_audio(outcome)?;

    Ok(Json(SynthesisJsonResponse {
        success: true,
        request_id,
        sample_rate: audio.sample_rate,
        duration: audio.duration_secs(),
        audio_size: audio.audio_size(),
        text,
    }))
}

/// `GET /tts/status/:id`
pub async fn tts_status(
    State(state): State<Arc<QueueState>>,
    Path(request_id): Path<String>,
) -> Response {
    match state.queue.status(&request_id) {
        StatusLookup::Pending(job_state) => {
            Json(StatusResponse::pending(request_id, &job_state)).into_response()
        }
        StatusLookup::Finished(outcome) => {
            tracing::info!(
                request_id = %request_id,
                status = outcome.state.as_str(),
                elapsed_ms = ?outcome.elapsed_ms(),
                "Job result delivered"
            );
            Json(StatusResponse::finished(&outcome)).into_response()
        }
        StatusLookup::NotFound => (
            StatusCode::NOT_FOUND,
            Json(StatusResponse::not_found(request_id)),
        )
            .into_response(),
    }
}
