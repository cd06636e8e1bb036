//! Proxy Handlers - 调度器
//!
//! `POST /tts`、`POST /tts/json` 轮询转发；`GET /tts/status/:id` 路由到任务所在后端

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::infrastructure::dispatcher::{ForwardRequest, ForwardedBody, ForwardedResponse};
use crate::infrastructure::http::dto::StatusResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::DispatcherState;

/// 把后端响应还原为出站响应：JSON 重新编码，二进制逐字节透传
fn relay(response: ForwardedResponse) -> Response {
    let ForwardedResponse {
        status,
        headers,
        body,
        ..
    } = response;

    match body {
        ForwardedBody::Json(value) => (status, headers, Json(value)).into_response(),
        ForwardedBody::Binary(bytes) => (status, headers, bytes).into_response(),
    }
}

/// 转发顶层请求
pub async fn forward(
    State(state): State<Arc<DispatcherState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let response = state
        .dispatcher
        .forward(ForwardRequest {
            method,
            path,
            headers,
            body,
        })
        .await?;

    Ok(relay(response))
}

/// 异步任务状态查询
pub async fn proxy_status(
    State(state): State<Arc<DispatcherState>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    match state.dispatcher.status(&request_id, headers).await? {
        Some(response) => Ok(relay(response)),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(StatusResponse::not_found(request_id)),
        )
            .into_response()),
    }
}
