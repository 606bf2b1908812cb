//! 会话 token 的签发与校验。

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::auth::store::unix_now;

/// token 主体取密码哈希前 16 个十六进制字符。
pub(crate) const TOKEN_SUBJECT_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// 校验时只关心过期时间，其余 claims 原样忽略。
#[derive(Debug, Deserialize)]
struct SessionClaims {
    exp: u64,
}

/// 签发会话 token：`header.payload.signature`，返回 token 与过期时间（unix 秒）。
pub(crate) fn issue_session_token(subject_hash: &str, secret: &str, ttl_sec: u64) -> (String, u64) {
    let now = unix_now();
    let exp = now.saturating_add(ttl_sec);
    let subject: String = subject_hash.chars().take(TOKEN_SUBJECT_LEN).collect();
    let header = json!({"alg": "HS256", "typ": "JWT"});
    let payload = json!({"sub": subject, "iat": now, "exp": exp});
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    let signing_input = format!("{header_b64}.{payload_b64}");
    let sig_b64 = hmac_b64url(secret, signing_input.as_bytes());
    (format!("{signing_input}.{sig_b64}"), exp)
}

/// 校验会话 token。
pub(crate) fn verify_session_token(token: &str, secret: &str) -> bool {
    verify_session_token_at(token, secret, unix_now())
}

/// 按给定时刻校验会话 token；任何解析失败都返回 false，绝不 panic。
///
/// 签名覆盖完整的 `header.payload` 文本，任何单字符篡改都会使校验失败；
/// 不做时钟偏移补偿。
pub(crate) fn verify_session_token_at(token: &str, secret: &str, now: u64) -> bool {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if header_b64.is_empty() || payload_b64.is_empty() || sig_b64.is_empty() {
        return false;
    }

    let Ok(sig) = URL_SAFE_NO_PAD.decode(sig_b64.as_bytes()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    // verify_slice 内部为常数时间比较。
    if mac.verify_slice(&sig).is_err() {
        return false;
    }

    let Ok(payload_raw) = URL_SAFE_NO_PAD.decode(payload_b64.as_bytes()) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<SessionClaims>(&payload_raw) else {
        return false;
    };
    claims.exp >= now
}

/// HMAC-SHA256 并输出 base64url（无填充）。
fn hmac_b64url(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key should be valid");
    mac.update(payload);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// sha256 hex。
pub(crate) fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// 常数时间字符串比较，用于旧版裸哈希凭证比对。
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
