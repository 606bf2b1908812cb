//! 凭证存储读写。

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::config::gateway_config_dir;

/// 凭证文件路径环境变量。
const CREDENTIALS_PATH_ENV: &str = "YD_CREDENTIALS_PATH";

/// 当前 unix 秒。
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 秒级精度 UTC 时间戳（RFC3339）。
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// 持久化凭证：管理密码哈希与 token 签名密钥。
///
/// 密码只保存 SHA-256 十六进制摘要，首次登录前 `password_hash` 为空。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CredentialStore {
    pub(crate) version: u32,
    pub(crate) password_hash: Option<String>,
    /// 会话 token 签名密钥（随机十六进制）。
    pub(crate) signing_secret: String,
    pub(crate) updated_at: Option<String>,
}

impl CredentialStore {
    pub(crate) fn new(signing_secret: String) -> Self {
        Self {
            version: 1,
            password_hash: None,
            signing_secret,
            updated_at: None,
        }
    }

    /// 是否已建立管理密码。
    pub(crate) fn configured(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// 凭证文件路径。
pub(crate) fn credentials_store_path() -> PathBuf {
    if let Ok(path) = std::env::var(CREDENTIALS_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    gateway_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credentials.json")
}

/// 加载凭证；文件不存在时返回带新签名密钥的空存储。
pub(crate) fn load_credential_store(path: &Path) -> Result<CredentialStore, String> {
    if !path.exists() {
        return Ok(CredentialStore::new(generate_signing_secret()));
    }
    let raw = fs::read(path).map_err(|err| format!("read credential store failed: {err}"))?;
    let mut parsed: CredentialStore = serde_json::from_slice(&raw)
        .map_err(|err| format!("decode credential store failed: {err}"))?;
    if parsed.signing_secret.trim().is_empty() {
        parsed.signing_secret = generate_signing_secret();
    }
    Ok(parsed)
}

/// 持久化凭证。
pub(crate) fn persist_credential_store(path: &Path, store: &CredentialStore) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("create credential store dir failed: {err}"))?;
    }
    let encoded = serde_json::to_vec_pretty(store)
        .map_err(|err| format!("encode credential store failed: {err}"))?;
    fs::write(path, encoded).map_err(|err| format!("write credential store failed: {err}"))
}

/// 生成 token 签名密钥。
pub(crate) fn generate_signing_secret() -> String {
    format!(
        "yd_sk_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("yd-store-test-{}", uuid::Uuid::new_v4().simple()))
            .join("credentials.json")
    }

    #[test]
    fn missing_file_yields_fresh_store_with_secret() {
        let path = temp_store_path();
        let store = load_credential_store(&path).unwrap();
        assert!(!store.configured());
        assert!(store.signing_secret.starts_with("yd_sk_"));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let path = temp_store_path();
        let mut store = CredentialStore::new("yd_sk_fixed".to_string());
        store.password_hash = Some("cafe".repeat(16));
        store.updated_at = Some(now_rfc3339());
        persist_credential_store(&path, &store).unwrap();

        let loaded = load_credential_store(&path).unwrap();
        assert!(loaded.configured());
        assert_eq!(loaded.signing_secret, "yd_sk_fixed");
        assert_eq!(loaded.password_hash, store.password_hash);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn blank_signing_secret_is_regenerated_on_load() {
        let path = temp_store_path();
        persist_credential_store(&path, &CredentialStore::new("  ".to_string())).unwrap();
        let loaded = load_credential_store(&path).unwrap();
        assert!(loaded.signing_secret.starts_with("yd_sk_"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
