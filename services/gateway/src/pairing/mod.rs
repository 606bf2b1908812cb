//! 设备配对：负载编码与二维码渲染。

use axum::{
    Json,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// 配对负载中的应用标识。
const PAIRING_APP_ID: &str = "yourdeck";

/// 扫码配对负载：宿主地址、端口与证书指纹。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PairingPayload {
    pub(crate) host: String,
    pub(crate) port: u16,
    /// 服务端证书指纹，客户端借此锚定自签名证书。
    pub(crate) fingerprint: String,
    pub(crate) app: &'static str,
}

impl PairingPayload {
    /// 组装配对负载。
    pub(crate) fn new(host: impl Into<String>, port: u16, fingerprint: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            fingerprint: fingerprint.into(),
            app: PAIRING_APP_ID,
        }
    }

    /// 紧凑 JSON 编码，二维码内容与 JSON 回退共用。
    pub(crate) fn to_compact_json(&self) -> String {
        serde_json::to_string(self).expect("pairing payload must be serializable")
    }
}

/// 渲染配对二维码 PNG（中等纠错级别）。
#[cfg(feature = "pairing-qr")]
pub(crate) fn render_qr_png(payload: &PairingPayload) -> anyhow::Result<Option<Vec<u8>>> {
    use image::{ImageFormat, Luma};
    use qrcode::{EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(payload.to_compact_json().as_bytes(), EcLevel::M)?;
    let image = code.render::<Luma<u8>>().min_dimensions(360, 360).build();
    let mut png = std::io::Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(Some(png.into_inner()))
}

/// 渲染依赖未启用：返回 None，由调用方退化为 JSON。
#[cfg(not(feature = "pairing-qr"))]
pub(crate) fn render_qr_png(_payload: &PairingPayload) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(None)
}

/// 配对接口：返回二维码 PNG；渲染不可用或失败时退化为 JSON 负载。
pub(crate) async fn pairing_handler(State(state): State<AppState>) -> Response {
    let payload = state.pairing_payload();
    match render_qr_png(&payload) {
        Ok(Some(png)) => ([(CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(None) => Json(payload).into_response(),
        Err(err) => {
            warn!("render pairing qr failed: {err:#}");
            Json(payload).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_compact_json_with_app_id() {
        let payload = PairingPayload::new("192.168.1.20", 18090, "ab".repeat(32));
        let json = payload.to_compact_json();
        assert!(json.contains("\"host\":\"192.168.1.20\""));
        assert!(json.contains("\"port\":18090"));
        assert!(json.contains("\"app\":\"yourdeck\""));
        assert!(!json.contains(' '));
    }

    #[cfg(feature = "pairing-qr")]
    #[test]
    fn qr_render_produces_png_bytes() {
        let payload = PairingPayload::new("127.0.0.1", 18090, "00".repeat(32));
        let png = render_qr_png(&payload).unwrap().expect("qr feature enabled");
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }
}
