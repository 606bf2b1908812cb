//! API 错误定义与响应转换。

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::response::ApiEnvelope;

/// 认证与接口错误。
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
    pub(crate) suggestion: &'static str,
    /// 限流错误附带的重试等待秒数（写入 `Retry-After`）。
    pub(crate) retry_after_sec: Option<u64>,
}

impl ApiError {
    /// 构造统一 API 错误。
    pub(crate) fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        suggestion: &'static str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestion,
            retry_after_sec: None,
        }
    }

    /// 统一 401：不区分缺失/篡改/过期，避免给调用方提供试探信号。
    pub(crate) fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "凭证无效或已过期",
            "请重新登录",
        )
    }

    /// 429 限流错误，携带重试等待秒数。
    pub(crate) fn rate_limited(retry_after_sec: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "RATE_LIMITED",
            message: "请求过于频繁".to_string(),
            suggestion: "请稍后重试",
            retry_after_sec: Some(retry_after_sec),
        }
    }
}

impl IntoResponse for ApiError {
    /// 转换为统一响应体，限流错误附带 `Retry-After` 头。
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ApiEnvelope::<Value> {
                ok: false,
                code: self.code.to_string(),
                message: self.message,
                suggestion: self.suggestion.to_string(),
                data: None,
            }),
        )
            .into_response();
        if let Some(sec) = self.retry_after_sec
            && let Ok(value) = HeaderValue::from_str(&sec.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}
