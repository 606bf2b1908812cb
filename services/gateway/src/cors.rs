//! CORS 策略：仅对显式配置的来源白名单附加跨域头，默认关闭。

use std::time::Duration;

use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

/// 预检结果缓存时长（秒）。
const CORS_MAX_AGE_SEC: u64 = 3600;

/// 解析配置的来源白名单；非法条目告警后跳过，不让配置错误拖垮进程。
pub(crate) fn parse_allowed_origins(raw: &[String]) -> Vec<String> {
    raw.iter()
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "*" {
                return Some("*".to_string());
            }
            match url::Url::parse(trimmed) {
                Ok(parsed) if parsed.host().is_some() => {
                    Some(trimmed.trim_end_matches('/').to_string())
                }
                _ => {
                    warn!("skip malformed cors origin: {trimmed}");
                    None
                }
            }
        })
        .collect()
}

/// 按白名单构造 CORS 层；白名单为空时返回 None，任何响应都不携带跨域头。
pub(crate) fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins = parse_allowed_origins(allowed_origins);
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SEC));

    if origins.iter().any(|origin| origin == "*") {
        return Some(layer.allow_origin(Any));
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(layer.allow_origin(AllowOrigin::list(values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_disables_cors_entirely() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["".to_string(), "   ".to_string()]).is_none());
    }

    #[test]
    fn malformed_origins_are_skipped_not_fatal() {
        let parsed = parse_allowed_origins(&[
            "https://a.example".to_string(),
            "not a url".to_string(),
            "https://b.example/".to_string(),
        ]);
        assert_eq!(parsed, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn all_malformed_origins_degrade_to_no_cors() {
        assert!(cors_layer(&["!!!".to_string(), "bare-host".to_string()]).is_none());
    }

    #[test]
    fn valid_origins_yield_a_layer() {
        assert!(cors_layer(&["https://a.example".to_string()]).is_some());
        assert!(cors_layer(&["*".to_string()]).is_some());
    }
}
