//! 登录与首次初始化接口处理。

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::{
    api::{
        error::ApiError,
        response::{ApiEnvelope, ok_response},
        types::{LoginRequest, LoginResponse, SetupPasswordRequest, SetupStatusData},
    },
    auth::token::{constant_time_eq, issue_session_token, sha256_hex},
    state::AppState,
};

/// 登录接口：首次登录建立凭证，此后校验密码哈希并签发会话 token。
///
/// 失败统一返回 401，不暴露具体原因；登录限流由门禁中间件先行处理。
pub(crate) async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if request.password.is_empty() {
        return Err(ApiError::unauthorized());
    }
    let presented_hash = sha256_hex(&request.password);

    let (configured, secret) = {
        let store = state.credentials.read().await;
        if let Some(existing) = store.password_hash.as_deref()
            && !constant_time_eq(existing, &presented_hash)
        {
            return Err(ApiError::unauthorized());
        }
        (store.configured(), store.signing_secret.clone())
    };

    if !configured {
        // 首次登录：当前密码哈希成为规范凭证。
        info!("first login establishes the admin credential");
        state.establish_credential(presented_hash.clone()).await;
    }

    let (token, expires) =
        issue_session_token(&presented_hash, &secret, state.config.token_ttl_sec);
    Ok(Json(LoginResponse {
        success: true,
        token,
        expires,
    }))
}

/// 初始化状态查询：告知前端是否已建立管理密码。
pub(crate) async fn setup_status_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiEnvelope<SetupStatusData>>) {
    let configured = state.credentials.read().await.configured();
    ok_response(
        StatusCode::OK,
        "查询成功",
        "",
        Some(SetupStatusData { configured }),
    )
}

/// 初始化提交：仅允许在凭证未建立时设置管理密码。
pub(crate) async fn setup_password_handler(
    State(state): State<AppState>,
    Json(request): Json<SetupPasswordRequest>,
) -> Result<(StatusCode, Json<ApiEnvelope<SetupStatusData>>), ApiError> {
    if request.password.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_PASSWORD",
            "密码不能为空",
            "请输入有效密码",
        ));
    }

    {
        let store = state.credentials.read().await;
        if store.configured() {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_CONFIGURED",
                "管理密码已设置",
                "请直接登录",
            ));
        }
    }

    state
        .establish_credential(sha256_hex(&request.password))
        .await;
    Ok(ok_response(
        StatusCode::OK,
        "初始化完成",
        "请使用新密码登录",
        Some(SetupStatusData { configured: true }),
    ))
}
