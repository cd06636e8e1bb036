//! HTTP Error Handling
//!
//! 错误以真实 HTTP 状态码返回，响应体统一为
//! `{error, message?, server?, request_id?}`

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::JobError;

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 出错的后端（调度器）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// 同步等待超时的任务 id，可稍后查询
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            server: None,
            request_id: None,
        }
    }
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// 后端不可达或超时
    BadGateway { server: String, message: String },
    /// 同步等待超时
    GatewayTimeout { request_id: String, message: String },
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let response = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(error = %msg, "Bad request");
                ErrorResponse::new(msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!(error = %msg, "Resource not found");
                ErrorResponse::new(msg)
            }
            ApiError::BadGateway { server, message } => {
                tracing::error!(server = %server, error = %message, "Backend request failed");
                ErrorResponse {
                    message: Some(message),
                    server: Some(server),
                    ..ErrorResponse::new("Backend request failed")
                }
            }
            ApiError::GatewayTimeout {
                request_id,
                message,
            } => {
                tracing::warn!(request_id = %request_id, error = %message, "Sync request timed out");
                ErrorResponse {
                    message: Some(message),
                    request_id: Some(request_id),
                    ..ErrorResponse::new("Timed out waiting for result")
                }
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "Service unavailable");
                ErrorResponse::new(msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ErrorResponse::new(msg)
            }
        };

        (status, Json(response)).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::BadRequest(msg) => ApiError::BadRequest(msg),
            JobError::BackendUnavailable { backend, message } => ApiError::BadGateway {
                server: backend,
                message,
            },
            JobError::InferenceFailure(msg) => ApiError::Internal(msg),
            JobError::Timeout { request_id, waited } => ApiError::GatewayTimeout {
                message: format!(
                    "No result after {:.3}s, query the status endpoint later",
                    waited.as_secs_f64()
                ),
                request_id,
            },
            e @ JobError::ResultGone(_) => ApiError::NotFound(e.to_string()),
            e @ (JobError::QueueFull | JobError::ShuttingDown) => {
                ApiError::ServiceUnavailable(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_job_error_status_mapping() {
        let cases = [
            (JobError::bad_request("Missing 'text' field"), StatusCode::BAD_REQUEST),
            (
                JobError::backend_unavailable("http://a:5000", "refused"),
                StatusCode::BAD_GATEWAY,
            ),
            (
                JobError::InferenceFailure("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                JobError::Timeout {
                    request_id: "r1".to_string(),
                    waited: std::time::Duration::from_secs(300),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (JobError::ResultGone("r1".to_string()), StatusCode::NOT_FOUND),
            (JobError::QueueFull, StatusCode::SERVICE_UNAVAILABLE),
            (JobError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_bad_gateway_names_backend() {
        let (status, body) = body_json(ApiError::from(JobError::backend_unavailable(
            "http://b:5001",
            "connection refused",
        )))
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["server"], "http://b:5001");
        assert_eq!(body["message"], "connection refused");
        assert!(body.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_timeout_carries_request_id() {
        let (status, body) = body_json(ApiError::from(JobError::Timeout {
            request_id: "abc".to_string(),
            waited: std::time::Duration::from_millis(250),
        }))
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["request_id"], "abc");
        assert!(body["message"].as_str().unwrap().contains("0.250s"));
    }
}
