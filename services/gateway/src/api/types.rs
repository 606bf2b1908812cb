//! API 请求/响应类型。

use serde::{Deserialize, Serialize};

/// 登录请求。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    pub(crate) password: String,
}

/// 登录响应（与既有 Web UI 字段约定保持一致）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub(crate) success: bool,
    pub(crate) token: String,
    /// 会话 token 过期时间（unix 秒）。
    pub(crate) expires: u64,
}

/// 初始化状态查询返回。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetupStatusData {
    pub(crate) configured: bool,
}

/// 初始化提交请求。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetupPasswordRequest {
    pub(crate) password: String,
}

/// 状态接口返回。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusData {
    pub(crate) version: String,
    pub(crate) uptime_sec: u64,
    pub(crate) cpu_percent: f64,
    pub(crate) memory_total_mb: f64,
    pub(crate) memory_used_mb: f64,
    pub(crate) tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) fingerprint: Option<String>,
}

/// WS 握手 query 参数：升级请求无法携带自定义头，token 走 query。
#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    #[serde(default)]
    pub(crate) token: String,
}
