//! Gateway 共享状态：配置、凭证存储、限流器与 TLS 身份。

use std::{path::PathBuf, sync::Arc, time::Instant};

use tokio::sync::RwLock;
use tracing::warn;

use crate::{
    api::error::ApiError,
    auth::{
        rate_limit::RateLimiter,
        store::{CredentialStore, now_rfc3339, persist_credential_store},
        token::verify_session_token,
    },
    config::GatewayConfig,
    pairing::PairingPayload,
    tls::TlsIdentity,
};

/// Gateway 共享状态。
#[derive(Clone)]
pub(crate) struct AppState {
    /// 运行配置（启动后只读）。
    pub(crate) config: Arc<GatewayConfig>,
    /// 凭证存储（持久化）。
    pub(crate) credentials: Arc<RwLock<CredentialStore>>,
    /// 凭证文件路径。
    pub(crate) credentials_path: Arc<PathBuf>,
    /// 双窗口限流器，进程生命周期内唯一实例。
    pub(crate) limiter: Arc<RateLimiter>,
    /// TLS 身份；未启用 TLS 时为空。
    pub(crate) tls: Arc<Option<TlsIdentity>>,
    /// 进程启动时间。
    pub(crate) started_at: Instant,
}

impl AppState {
    /// 组装共享状态。
    pub(crate) fn new(
        config: GatewayConfig,
        credentials: CredentialStore,
        credentials_path: PathBuf,
        tls: Option<TlsIdentity>,
    ) -> Self {
        let limiter = RateLimiter::new(
            config.general_limit,
            config.general_window_sec,
            config.login_limit,
            config.login_window_sec,
        );
        Self {
            config: Arc::new(config),
            credentials: Arc::new(RwLock::new(credentials)),
            credentials_path: Arc::new(credentials_path),
            limiter: Arc::new(limiter),
            tls: Arc::new(tls),
            started_at: Instant::now(),
        }
    }

    /// 校验 Bearer 凭证：旧版裸密码哈希（兼容分支）或签名 token。
    pub(crate) async fn authorize_bearer(&self, presented: &str) -> Result<(), ApiError> {
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(ApiError::unauthorized());
        }
        let store = self.credentials.read().await;
        #[cfg(feature = "legacy-hash-auth")]
        if let Some(hash) = store.password_hash.as_deref()
            && crate::auth::token::constant_time_eq(presented, hash)
        {
            return Ok(());
        }
        if verify_session_token(presented, &store.signing_secret) {
            return Ok(());
        }
        Err(ApiError::unauthorized())
    }

    /// 首次登录/初始化时落盘管理密码哈希。
    pub(crate) async fn establish_credential(&self, password_hash: String) {
        let mut store = self.credentials.write().await;
        store.password_hash = Some(password_hash);
        store.updated_at = Some(now_rfc3339());
        if let Err(err) = persist_credential_store(&self.credentials_path, &store) {
            warn!("persist credential store failed: {err}");
        }
    }

    /// 组装配对负载。
    pub(crate) fn pairing_payload(&self) -> PairingPayload {
        let fingerprint = match self.tls.as_ref() {
            Some(identity) => identity.fingerprint.clone(),
            None => String::new(),
        };
        PairingPayload::new(
            self.config.advertise_host.clone(),
            self.config.port(),
            fingerprint,
        )
    }
}
