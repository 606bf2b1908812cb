//! 实时流接口：升级握手鉴权与事件回传。

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api::{error::ApiError, types::WsQuery},
    auth::store::now_rfc3339,
    state::AppState,
};

/// WS 握手入口：浏览器无法在升级请求上携带自定义头，凭证走 query token。
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize_bearer(&query.token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket)))
}

/// 单连接处理：下发 hello 事件，回执文本消息，响应 ping。
async fn handle_socket(state: AppState, socket: WebSocket) {
    let client_id = Uuid::new_v4();
    let (mut sender, mut reader) = socket.split();
    info!("ws connected client={client_id}");

    let hello = json!({
        "v": 1,
        "type": "server.hello",
        "clientId": client_id.to_string(),
        "uptimeSec": state.started_at.elapsed().as_secs(),
        "ts": now_rfc3339(),
    });
    if sender
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(next) = reader.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(err) => {
                warn!("ws read error client={client_id}: {err}");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let ack = json!({
                    "v": 1,
                    "type": "server.ack",
                    "echo": text.as_str(),
                    "ts": now_rfc3339(),
                });
                if sender
                    .send(Message::Text(ack.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Ping(payload) => {
                if sender.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!("ws disconnected client={client_id}");
}
