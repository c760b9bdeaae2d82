//! ==============================================================================
//! server.rs - live broadcast + status api
//! ==============================================================================
//!
//! routes:
//!     GET /            small live page, subscribes to /ws
//!     GET /ws          websocket; one json frame per broadcast tick
//!     GET /api/status  latest reading, mood, link, counters, host stats
//!
//! the server runs as a task on the loop's current-thread runtime. it only
//! ever reads node state; frames arrive through the WsBroadcaster channel.
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;

use crate::config::BroadcastConfig;
use crate::node::{NodeStatus, SharedStatus};
use crate::transport::WsBroadcaster;

#[derive(Clone)]
pub struct ServerState {
    pub status: SharedStatus,
    pub broadcaster: WsBroadcaster,
}

/// Bind up front so a taken port stops startup instead of a background task.
pub async fn bind(cfg: &BroadcastConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", cfg.bind, cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    Ok(listener)
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

// ==============================================================================
// websocket
// ==============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    let frames = state.broadcaster.subscribe();
    ws.on_upgrade(move |socket| listener_session(socket, addr, frames))
}

async fn listener_session(
    socket: WebSocket,
    addr: SocketAddr,
    mut frames: broadcast::Receiver<String>,
) {
    tracing::info!("[{}] listener connected", addr);
    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if outgoing.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("[{}] slow listener dropped {} frames", addr, n)
                }
                Err(RecvError::Closed) => break,
            },
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // listeners have nothing to say; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("[{}] listener disconnected", addr);
}

// ==============================================================================
// status api
// ==============================================================================

#[derive(Serialize)]
struct HostStats {
    uptime_secs: u64,
    mem_used_kb: u64,
    mem_total_kb: u64,
}

fn host_stats() -> HostStats {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    HostStats {
        uptime_secs: sysinfo::System::uptime(),
        mem_used_kb: sys.used_memory() / 1024,
        mem_total_kb: sys.total_memory() / 1024,
    }
}

#[derive(Serialize)]
struct StatusResponse {
    node: NodeStatus,
    listeners: usize,
    host: HostStats,
}

async fn status_handler(State(state): State<ServerState>) -> Json<StatusResponse> {
    let node = state.status.read().await.clone();
    Json(StatusResponse { node, listeners: state.broadcaster.listener_count(), host: host_stats() })
}

async fn page_handler() -> Html<&'static str> {
    Html(LIVE_PAGE)
}

const LIVE_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Plant Buddy</title></head>
<body style="font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee;">
    <h1>Smart Plant Buddy</h1>
    <pre id="face" style="font-size: 3rem;">-_-</pre>
    <p id="values">waiting for the first frame...</p>
    <script>
        const faces = {happy: "^_^", thirsty: "O_O", drowning: "@_@", hot: ">_<"};
        const ws = new WebSocket(`ws://${location.host}/ws`);
        ws.onmessage = (ev) => {
            const f = JSON.parse(ev.data);
            document.getElementById("face").textContent = faces[f.mood] || "-_-";
            document.getElementById("values").textContent =
                `soil ${f.soil} | light ${f.light} | ${f.temp}°C | ${f.hum}% | ${f.mood}`;
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn status_endpoint_reports_node_state() {
        let status: SharedStatus = Arc::new(RwLock::new(NodeStatus::default()));
        status.write().await.counters.broadcasts = 3;
        let state = ServerState { status, broadcaster: WsBroadcaster::new(4) };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        let body: serde_json::Value = reqwest::get(format!("http://{}/api/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["node"]["counters"]["broadcasts"], 3);
        assert_eq!(body["node"]["link"], "reconnecting");
        assert_eq!(body["listeners"], 0);
        assert!(body["host"]["mem_total_kb"].is_u64());

        let page = reqwest::get(format!("http://{}/", addr)).await.unwrap().text().await.unwrap();
        assert!(page.contains("/ws"));
    }
}
