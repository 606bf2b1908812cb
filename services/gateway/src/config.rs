//! 配置模块职责：
//! 1. 读取 gateway 运行所需的环境变量与持久化配置文件，并提供默认值。
//! 2. 以 env > 文件 > 默认值 的纯合并函数产出运行配置。
//! 3. 提供布尔/整数/CSV 解析与监听地址校验等通用能力。

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tls::detect_lan_ipv4;

/// 默认监听地址。
const DEFAULT_ADDR: &str = "0.0.0.0:18090";
/// 通用 API 限流默认值（次/窗口）。
const DEFAULT_GENERAL_LIMIT: usize = 240;
/// 通用 API 限流窗口（秒）。
const DEFAULT_GENERAL_WINDOW_SEC: u64 = 60;
/// 登录限流默认值（次/窗口）。
const DEFAULT_LOGIN_LIMIT: usize = 5;
/// 登录限流窗口（秒）。
const DEFAULT_LOGIN_WINDOW_SEC: u64 = 60;
/// 会话 token 默认有效期（秒）。
const DEFAULT_TOKEN_TTL_SEC: u64 = 86_400;
/// 持久化配置版本。
const GATEWAY_CONFIG_VERSION: u8 = 1;

/// gateway 持久化配置（仅存可覆盖项，不存敏感凭证）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedConfig {
    /// 配置结构版本。
    #[serde(default = "default_config_version")]
    pub(crate) version: u8,
    #[serde(default)]
    pub(crate) http_addr: Option<String>,
    #[serde(default)]
    pub(crate) tls_enabled: Option<bool>,
    #[serde(default)]
    pub(crate) cert_dir: Option<String>,
    #[serde(default)]
    pub(crate) allowed_origins: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) general_limit: Option<usize>,
    #[serde(default)]
    pub(crate) general_window_sec: Option<u64>,
    #[serde(default)]
    pub(crate) login_limit: Option<usize>,
    #[serde(default)]
    pub(crate) login_window_sec: Option<u64>,
    #[serde(default)]
    pub(crate) token_ttl_sec: Option<u64>,
    #[serde(default)]
    pub(crate) advertise_host: Option<String>,
}

/// 返回持久化配置版本默认值。
fn default_config_version() -> u8 {
    GATEWAY_CONFIG_VERSION
}

/// 环境变量覆盖项，与持久化配置字段一一对应。
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvOverrides {
    pub(crate) http_addr: Option<String>,
    pub(crate) tls_enabled: Option<bool>,
    pub(crate) cert_dir: Option<String>,
    pub(crate) allowed_origins: Option<Vec<String>>,
    pub(crate) general_limit: Option<usize>,
    pub(crate) general_window_sec: Option<u64>,
    pub(crate) login_limit: Option<usize>,
    pub(crate) login_window_sec: Option<u64>,
    pub(crate) token_ttl_sec: Option<u64>,
    pub(crate) advertise_host: Option<String>,
}

impl EnvOverrides {
    /// 抓取 `YD_*` 环境变量。
    pub(crate) fn capture() -> Self {
        Self {
            http_addr: string_from_env("YD_ADDR"),
            tls_enabled: bool_from_env_optional("YD_TLS"),
            cert_dir: string_from_env("YD_TLS_DIR"),
            allowed_origins: csv_list_from_env_optional("YD_ALLOWED_ORIGINS"),
            general_limit: usize_from_env_optional("YD_RATE_LIMIT"),
            general_window_sec: u64_from_env_optional("YD_RATE_WINDOW_SEC"),
            login_limit: usize_from_env_optional("YD_LOGIN_LIMIT"),
            login_window_sec: u64_from_env_optional("YD_LOGIN_WINDOW_SEC"),
            token_ttl_sec: u64_from_env_optional("YD_TOKEN_TTL_SEC"),
            advertise_host: string_from_env("YD_ADVERTISE_HOST"),
        }
    }
}

/// Gateway 运行时配置。
#[derive(Debug, Clone)]
pub(crate) struct GatewayConfig {
    /// HTTP/TLS 监听地址。
    pub(crate) http_addr: String,
    /// 是否启用 TLS 监听。
    pub(crate) tls_enabled: bool,
    /// 证书目录。
    pub(crate) cert_dir: PathBuf,
    /// CORS 来源白名单；为空表示不附加任何跨域头。
    pub(crate) allowed_origins: Vec<String>,
    /// 通用 API 限流额度。
    pub(crate) general_limit: usize,
    /// 通用 API 限流窗口（秒）。
    pub(crate) general_window_sec: u64,
    /// 登录限流额度。
    pub(crate) login_limit: usize,
    /// 登录限流窗口（秒）。
    pub(crate) login_window_sec: u64,
    /// 会话 token 有效期（秒）。
    pub(crate) token_ttl_sec: u64,
    /// 对外公布的宿主地址（配对负载使用）。
    pub(crate) advertise_host: String,
}

impl Default for GatewayConfig {
    /// 返回纯默认配置（不读环境，不探测网络）。
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_ADDR.to_string(),
            tls_enabled: false,
            cert_dir: default_cert_dir(),
            allowed_origins: Vec::new(),
            general_limit: DEFAULT_GENERAL_LIMIT,
            general_window_sec: DEFAULT_GENERAL_WINDOW_SEC,
            login_limit: DEFAULT_LOGIN_LIMIT,
            login_window_sec: DEFAULT_LOGIN_WINDOW_SEC,
            token_ttl_sec: DEFAULT_TOKEN_TTL_SEC,
            advertise_host: "127.0.0.1".to_string(),
        }
    }
}

impl GatewayConfig {
    /// 从环境变量与配置文件构建配置，并校验监听地址。
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let persisted = load_persisted_config().unwrap_or_else(|err| {
            warn!("load gateway config failed: {err}");
            PersistedConfig::default()
        });
        let mut config = merge(persisted, EnvOverrides::capture())?;
        if config.advertise_host == "127.0.0.1"
            && let Some(lan) = detect_lan_ipv4()
        {
            config.advertise_host = lan.to_string();
        }
        Ok(config)
    }

    /// 监听端口（配对负载使用）。
    pub(crate) fn port(&self) -> u16 {
        self.http_addr
            .parse::<SocketAddr>()
            .map(|addr| addr.port())
            .unwrap_or(0)
    }
}

/// 纯合并：env 覆盖持久化值，再回退默认；监听地址非法时报错。
pub(crate) fn merge(
    persisted: PersistedConfig,
    env: EnvOverrides,
) -> anyhow::Result<GatewayConfig> {
    let defaults = GatewayConfig::default();
    let http_addr = env
        .http_addr
        .or(persisted.http_addr)
        .unwrap_or(defaults.http_addr);
    http_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen addr: {http_addr}"))?;

    let cert_dir = env
        .cert_dir
        .or(persisted.cert_dir)
        .map(PathBuf::from)
        .unwrap_or(defaults.cert_dir);

    Ok(GatewayConfig {
        http_addr,
        tls_enabled: env
            .tls_enabled
            .or(persisted.tls_enabled)
            .unwrap_or(defaults.tls_enabled),
        cert_dir,
        allowed_origins: env
            .allowed_origins
            .or(persisted.allowed_origins)
            .unwrap_or(defaults.allowed_origins),
        general_limit: env
            .general_limit
            .or(persisted.general_limit)
            .unwrap_or(defaults.general_limit),
        general_window_sec: env
            .general_window_sec
            .or(persisted.general_window_sec)
            .unwrap_or(defaults.general_window_sec),
        login_limit: env
            .login_limit
            .or(persisted.login_limit)
            .unwrap_or(defaults.login_limit),
        login_window_sec: env
            .login_window_sec
            .or(persisted.login_window_sec)
            .unwrap_or(defaults.login_window_sec),
        token_ttl_sec: env
            .token_ttl_sec
            .or(persisted.token_ttl_sec)
            .unwrap_or(defaults.token_ttl_sec),
        advertise_host: env
            .advertise_host
            .or(persisted.advertise_host)
            .unwrap_or(defaults.advertise_host),
    })
}

/// gateway 配置目录：`~/.config/yourdeck/gateway`。
pub(crate) fn gateway_config_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        Path::new(&home)
            .join(".config")
            .join("yourdeck")
            .join("gateway"),
    )
}

/// 默认证书目录。
fn default_cert_dir() -> PathBuf {
    gateway_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tls")
}

/// 配置文件路径。
pub(crate) fn config_file_path() -> Option<PathBuf> {
    Some(gateway_config_dir()?.join("config.json"))
}

/// 读取持久化配置；文件不存在时返回默认值。
pub(crate) fn load_persisted_config() -> anyhow::Result<PersistedConfig> {
    let Some(path) = config_file_path() else {
        return Ok(PersistedConfig::default());
    };
    if !path.exists() {
        return Ok(PersistedConfig::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read gateway config failed: {}", path.display()))?;
    let mut parsed: PersistedConfig = serde_json::from_str(&raw)
        .with_context(|| format!("decode gateway config failed: {}", path.display()))?;
    if parsed.version == 0 {
        parsed.version = GATEWAY_CONFIG_VERSION;
    }
    Ok(parsed)
}

/// 读取字符串环境变量；空白视为未设置。
fn string_from_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// 将逗号分隔的环境变量解析为字符串列表；未设置时返回 None。
fn csv_list_from_env_optional(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<String>>()
    })
}

/// 解析可选布尔环境变量，支持常见 true/false 文本。
fn bool_from_env_optional(key: &str) -> Option<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

/// 读取 usize 环境变量，非法或非正值视为未设置。
fn usize_from_env_optional(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

/// 读取 u64 环境变量，非法或非正值视为未设置。
fn u64_from_env_optional(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_defaults_when_nothing_is_set() {
        let config = merge(PersistedConfig::default(), EnvOverrides::default()).unwrap();
        assert_eq!(config.http_addr, DEFAULT_ADDR);
        assert!(!config.tls_enabled);
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.general_limit, DEFAULT_GENERAL_LIMIT);
        assert_eq!(config.login_limit, DEFAULT_LOGIN_LIMIT);
        assert_eq!(config.token_ttl_sec, DEFAULT_TOKEN_TTL_SEC);
    }

    #[test]
    fn env_overrides_beat_persisted_values() {
        let persisted = PersistedConfig {
            http_addr: Some("127.0.0.1:9000".to_string()),
            login_limit: Some(3),
            ..PersistedConfig::default()
        };
        let env = EnvOverrides {
            http_addr: Some("127.0.0.1:9001".to_string()),
            ..EnvOverrides::default()
        };
        let config = merge(persisted, env).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9001");
        // env 未覆盖的字段取持久化值。
        assert_eq!(config.login_limit, 3);
    }

    #[test]
    fn persisted_values_beat_defaults() {
        let persisted = PersistedConfig {
            tls_enabled: Some(true),
            allowed_origins: Some(vec!["https://a.example".to_string()]),
            ..PersistedConfig::default()
        };
        let config = merge(persisted, EnvOverrides::default()).unwrap();
        assert!(config.tls_enabled);
        assert_eq!(config.allowed_origins, vec!["https://a.example"]);
    }

    #[test]
    fn merge_rejects_invalid_listen_addr() {
        let env = EnvOverrides {
            http_addr: Some("not-an-addr".to_string()),
            ..EnvOverrides::default()
        };
        assert!(merge(PersistedConfig::default(), env).is_err());
    }

    #[test]
    fn port_parses_from_listen_addr() {
        let config = GatewayConfig {
            http_addr: "0.0.0.0:18090".to_string(),
            ..GatewayConfig::default()
        };
        assert_eq!(config.port(), 18090);
    }
}
