//! Gateway 应用装配：证书供给、路由、CORS、门禁与监听。

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::Html,
    routing::{get, post},
};
use tracing::{info, warn};

use crate::{
    api::{
        response::{ApiEnvelope, ok_response},
        types::StatusData,
    },
    auth::{
        handlers::{login_handler, setup_password_handler, setup_status_handler},
        middleware::require_access,
        store::{CredentialStore, credentials_store_path, generate_signing_secret, load_credential_store},
    },
    config::GatewayConfig,
    cors::cors_layer,
    pairing::pairing_handler,
    state::AppState,
    tls,
    ws::ws_handler,
};

/// Gateway 入口：装配状态与路由并启动监听。
pub(crate) async fn run() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    let addr: SocketAddr = config
        .http_addr
        .parse()
        .with_context(|| format!("invalid listen addr: {}", config.http_addr))?;

    // 证书供给只在启动路径执行一次；TLS 被显式要求时失败即中止，
    // 绝不降级为明文监听。
    let tls_identity = if config.tls_enabled {
        Some(tls::ensure(&config.cert_dir).context("provision tls certificate failed")?)
    } else {
        None
    };

    let credentials_path = credentials_store_path();
    let credentials = load_credential_store(&credentials_path).unwrap_or_else(|err| {
        warn!("load credential store failed: {err}");
        CredentialStore::new(generate_signing_secret())
    });
    let state = AppState::new(config, credentials, credentials_path, tls_identity.clone());

    let mut app = Router::new()
        .route("/", get(landing))
        .route("/login", post(login_handler))
        .route("/setup/status", get(setup_status_handler))
        .route("/setup/password", post(setup_password_handler))
        .route("/api/status", get(status_handler))
        .route("/api/pairing", get(pairing_handler))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_access));
    match cors_layer(&state.config.allowed_origins) {
        Some(cors) => {
            app = app.layer(cors);
        }
        None => info!("cors disabled: no allowed origins configured"),
    }
    let app = app.with_state(state);

    match tls_identity {
        Some(identity) => {
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &identity.cert_path,
                &identity.key_path,
            )
            .await
            .context("load tls certificate failed")?;
            info!(
                "yd-gateway listening on https://{addr} (cert fingerprint {})",
                identity.fingerprint
            );
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("yd-gateway listening on http://{addr}");
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }
    Ok(())
}

/// landing 页：Web UI 由外部协作方提供，这里仅返回占位页面。
async fn landing() -> Html<&'static str> {
    Html("<!doctype html><title>yourDeck</title><p>yourDeck gateway is running.</p>")
}

/// 状态接口：版本、运行时长与主机指标快照。
async fn status_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiEnvelope<StatusData>>) {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.refresh_cpu_usage();

    let fingerprint = match state.tls.as_ref() {
        Some(identity) => Some(identity.fingerprint.clone()),
        None => None,
    };
    let data = StatusData {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        cpu_percent: f64::from(system.global_cpu_usage()),
        memory_total_mb: system.total_memory() as f64 / 1024.0 / 1024.0,
        memory_used_mb: system.used_memory() as f64 / 1024.0 / 1024.0,
        tls: state.tls.is_some(),
        fingerprint,
    };
    ok_response(StatusCode::OK, "查询成功", "", Some(data))
}
