//! 请求门禁：限流在前、凭证在后、豁免路由表兜底，首个命中规则生效。

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, Uri, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{api::error::ApiError, state::AppState};

/// 免 token 校验的路由表：landing、登录与首次初始化。
const EXEMPT_ROUTES: [(Method, &str); 4] = [
    (Method::GET, "/"),
    (Method::POST, "/login"),
    (Method::GET, "/setup/status"),
    (Method::POST, "/setup/password"),
];

/// 实时流升级端点：凭证走 query token，由握手处理器自行校验。
const REALTIME_STREAM_PATH: &str = "/ws";
/// 受保护 API 前缀。
const API_PREFIX: &str = "/api/";
/// 登录端点路径。
const LOGIN_PATH: &str = "/login";

/// 判断 `(method, path)` 是否在豁免表中。
pub(crate) fn is_exempt(method: &Method, path: &str) -> bool {
    EXEMPT_ROUTES
        .iter()
        .any(|(exempt_method, exempt_path)| exempt_method == method && *exempt_path == path)
}

/// 从 `Authorization: Bearer` 头或 query `token` 参数提取凭证。
pub(crate) fn extract_bearer(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    query_token(uri)
}

/// 从 query string 提取 `token` 参数（旧客户端兼容路径）。
pub(crate) fn query_token(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// 请求门禁中间件。
///
/// 客户端键取传输层对端地址而非 `X-Forwarded-For`：局域网单实例部署下
/// 转发头可被任意伪造。
pub(crate) async fn require_access(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let bearer = extract_bearer(request.headers(), request.uri());
    state
        .authorize_request(&method, &path, &peer.ip().to_string(), bearer.as_deref())
        .await?;
    Ok(next.run(request).await)
}

impl AppState {
    /// 门禁决策，严格按序：登录限流 → API 限流 → 豁免表 → 凭证校验。
    pub(crate) async fn authorize_request(
        &self,
        method: &Method,
        path: &str,
        client_key: &str,
        bearer: Option<&str>,
    ) -> Result<(), ApiError> {
        if method == Method::POST && path == LOGIN_PATH {
            if !self.limiter.check_login(client_key) {
                return Err(ApiError::rate_limited(
                    self.limiter.retry_after(client_key, true),
                ));
            }
            // 登录本身建立凭证，不做 token 校验。
            return Ok(());
        }

        if path.starts_with(API_PREFIX) && !self.limiter.check_general(client_key) {
            return Err(ApiError::rate_limited(
                self.limiter.retry_after(client_key, false),
            ));
        }

        if is_exempt(method, path) || path == REALTIME_STREAM_PATH {
            return Ok(());
        }

        match bearer {
            Some(presented) => self.authorize_bearer(presented).await,
            None => Err(ApiError::unauthorized()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::http::StatusCode;

    use super::*;
    use crate::{
        auth::{
            store::CredentialStore,
            token::{issue_session_token, sha256_hex},
        },
        config::GatewayConfig,
    };

    const PEER: &str = "192.168.1.50";

    fn test_state(login_limit: usize) -> AppState {
        let config = GatewayConfig {
            login_limit,
            ..GatewayConfig::default()
        };
        let mut store = CredentialStore::new("yd_sk_test".to_string());
        store.password_hash = Some(sha256_hex("hunter2"));
        let path = std::env::temp_dir().join(format!(
            "yd-mw-test-{}",
            uuid::Uuid::new_v4().simple()
        ));
        AppState::new(config, store, PathBuf::from(path), None)
    }

    #[test]
    fn exempt_table_covers_landing_login_and_setup() {
        assert!(is_exempt(&Method::GET, "/"));
        assert!(is_exempt(&Method::POST, "/login"));
        assert!(is_exempt(&Method::GET, "/setup/status"));
        assert!(is_exempt(&Method::POST, "/setup/password"));
        assert!(!is_exempt(&Method::GET, "/login"));
        assert!(!is_exempt(&Method::GET, "/api/status"));
    }

    #[test]
    fn bearer_extraction_prefers_header_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        let uri: Uri = "/api/status?token=from-query".parse().unwrap();
        assert_eq!(extract_bearer(&headers, &uri), Some("abc".to_string()));

        let no_header = HeaderMap::new();
        assert_eq!(
            extract_bearer(&no_header, &uri),
            Some("from-query".to_string())
        );
        let bare: Uri = "/api/status".parse().unwrap();
        assert_eq!(extract_bearer(&no_header, &bare), None);
    }

    #[tokio::test]
    async fn login_bypasses_token_check_but_hits_login_limit() {
        let state = test_state(2);
        assert!(
            state
                .authorize_request(&Method::POST, "/login", PEER, None)
                .await
                .is_ok()
        );
        assert!(
            state
                .authorize_request(&Method::POST, "/login", PEER, None)
                .await
                .is_ok()
        );
        let err = state
            .authorize_request(&Method::POST, "/login", PEER, None)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(err.retry_after_sec.is_some());
    }

    #[tokio::test]
    async fn protected_path_requires_credential() {
        let state = test_state(5);
        let err = state
            .authorize_request(&Method::GET, "/api/status", PEER, None)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = state
            .authorize_request(&Method::GET, "/api/status", PEER, Some("garbage"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[cfg(feature = "legacy-hash-auth")]
    #[tokio::test]
    async fn legacy_hash_is_accepted_verbatim() {
        let state = test_state(5);
        let hash = sha256_hex("hunter2");
        assert!(
            state
                .authorize_request(&Method::GET, "/api/status", PEER, Some(&hash))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn signed_token_is_accepted_on_protected_path() {
        let state = test_state(5);
        let (token, _) = issue_session_token(&sha256_hex("hunter2"), "yd_sk_test", 600);
        assert!(
            state
                .authorize_request(&Method::GET, "/api/status", PEER, Some(&token))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn exempt_and_stream_paths_pass_without_credential() {
        let state = test_state(5);
        assert!(
            state
                .authorize_request(&Method::GET, "/", PEER, None)
                .await
                .is_ok()
        );
        assert!(
            state
                .authorize_request(&Method::GET, "/ws", PEER, None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn general_limit_applies_to_api_prefix() {
        let config = GatewayConfig {
            general_limit: 1,
            ..GatewayConfig::default()
        };
        let mut store = CredentialStore::new("yd_sk_test".to_string());
        store.password_hash = Some(sha256_hex("hunter2"));
        let state = AppState::new(
            config,
            store,
            std::env::temp_dir().join("yd-mw-general"),
            None,
        );
        let (token, _) = issue_session_token(&sha256_hex("hunter2"), "yd_sk_test", 600);
        assert!(
            state
                .authorize_request(&Method::GET, "/api/status", PEER, Some(&token))
                .await
                .is_ok()
        );
        let err = state
            .authorize_request(&Method::GET, "/api/status", PEER, Some(&token))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
    }
}
