// sky-server/src/main.rs

// --- Standard Imports ---
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use sky_common::{CapabilityDescription, DiscoveryResponse, MCP_SESSION_ID_HEADER};
use std::{
    collections::HashMap,
    convert::Infallible,
    error::Error,
    net::SocketAddr,
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    time::{Duration, Instant},
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// --- Local Modules ---
mod admin;
mod config;
mod http;
mod message_handler;
mod plugin_registry;
mod plugins;
mod rpc;
mod traits;

use config::ServerConfig;
use message_handler::McpMessageHandler;
use plugin_registry::PluginRegistry;
use rpc::RpcContext;
use traits::MessageHandler;

// --- Shared Application State ---
pub struct AppState {
    rpc: Arc<RpcContext>,
    message_handler: Arc<McpMessageHandler>,
    http_sessions: Arc<RwLock<HashMap<String, HttpSessionInfo>>>,
    active_ws_connections: AtomicUsize,
    request_count: AtomicUsize,
    startup_time: Instant,
}

/// Sessions untouched for this long are dropped when a new one is issued.
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

// --- Session Info for Streamable HTTP ---
struct HttpSessionInfo {
    created: Instant,
    last_seen: Instant,
    last_event_id: Option<String>,
}

impl HttpSessionInfo {
    fn new() -> Self {
        let now = Instant::now();
        HttpSessionInfo { created: now, last_seen: now, last_event_id: None }
    }
}

fn prune_idle_sessions(sessions: &mut HashMap<String, HttpSessionInfo>, now: Instant) {
    let before = sessions.len();
    sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) < SESSION_IDLE_TIMEOUT);
    if sessions.len() < before {
        info!("Dropped {} idle HTTP sessions", before - sessions.len());
    }
}

impl AppState {
    fn new(rpc: Arc<RpcContext>) -> Arc<Self> {
        Arc::new(AppState {
            message_handler: Arc::new(McpMessageHandler::new(rpc.clone())),
            rpc,
            http_sessions: Arc::new(RwLock::new(HashMap::new())),
            active_ws_connections: AtomicUsize::new(0),
            request_count: AtomicUsize::new(0),
            startup_time: Instant::now(),
        })
    }
}

fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", get(handle_streamable_get).post(handle_streamable_post).delete(handle_streamable_delete))
        .route("/mcpi", get(ws_handler))
        .route("/mcpi/discover", get(discovery_handler))
        .route("/api/admin/stats", get(admin::get_stats))
        .route("/api/admin/plugins", get(admin::get_plugins))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// --- Main Function ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    let mut registry = PluginRegistry::new();
    let catalog = plugins::register_all_plugins(&mut registry, &config)?;
    info!("Registered {} plugins", registry.get_all_plugins().len());

    // Station codes complete only once the catalogue is in memory.
    tokio::spawn(async move {
        if let Err(e) = catalog.get().await {
            warn!("Station catalogue unavailable: {}", e);
        }
    });

    let rpc = Arc::new(RpcContext { registry: Arc::new(registry), provider: config.provider.clone() });
    let app_router = build_router(AppState::new(rpc));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Sky server listening on {} (MCP at /mcp, WebSocket at /mcpi)", addr);

    axum::serve(listener, app_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down successfully");
    Ok(())
}

// --- Graceful Shutdown Signal Handler ---
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received..."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers.get(MCP_SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
}

// --- Streamable HTTP Handlers ---
async fn handle_streamable_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);
    let Some(session_id) = session_header(&headers) else {
        warn!("GET /mcp missing {}", MCP_SESSION_ID_HEADER);
        return (StatusCode::BAD_REQUEST, "mcp-session-id header required").into_response();
    };

    let mut sessions = state.http_sessions.write().await;
    let Some(session) = sessions.get_mut(&session_id) else {
        warn!("GET /mcp for unknown session {}", session_id);
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };
    session.last_seen = Instant::now();
    if let Some(last) = headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
        session.last_event_id = Some(last.to_string());
    }
    info!(
        "SSE stream opened for session {} (age {}s, last event {:?})",
        session_id,
        session.created.elapsed().as_secs(),
        session.last_event_id
    );

    Sse::new(idle_stream()).keep_alive(KeepAlive::default()).into_response()
}

/// The server never pushes requests, so the stream only carries keep-alives.
fn idle_stream() -> impl Stream<Item = Result<Event, Infallible>> {
    stream::once(async { Ok(Event::default().comment("connected")) }).chain(stream::pending())
}

async fn handle_streamable_post(State(state): State<Arc<AppState>>, headers: HeaderMap, body: String) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);

    let mut new_session = None;
    let client_id = match session_header(&headers) {
        Some(id) => {
            match state.http_sessions.write().await.get_mut(&id) {
                Some(session) => session.last_seen = Instant::now(),
                None => warn!("POST /mcp for unknown session {}", id),
            }
            id
        }
        None if rpc::is_initialize(&body) => {
            let id = Uuid::new_v4().to_string();
            let mut sessions = state.http_sessions.write().await;
            prune_idle_sessions(&mut sessions, Instant::now());
            sessions.insert(id.clone(), HttpSessionInfo::new());
            drop(sessions);
            info!("New HTTP session {}", id);
            new_session = Some(id.clone());
            id
        }
        None => format!("http-{}", Uuid::new_v4().simple()),
    };

    let Some(response_body) = state.message_handler.handle_message(body, client_id).await else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let mut response = (StatusCode::OK, [("content-type", "application/json")], response_body).into_response();
    if let Some(id) = new_session {
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
    }
    response
}

async fn handle_streamable_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);
    let Some(session_id) = session_header(&headers) else {
        warn!("DELETE /mcp missing {}", MCP_SESSION_ID_HEADER);
        return (StatusCode::BAD_REQUEST, "mcp-session-id header required").into_response();
    };
    if state.http_sessions.write().await.remove(&session_id).is_some() {
        info!("Session {} terminated via DELETE /mcp", session_id);
        (StatusCode::OK, "Session terminated").into_response()
    } else {
        warn!("DELETE /mcp for unknown session {}", session_id);
        (StatusCode::NOT_FOUND, "Session not found").into_response()
    }
}

// --- WebSocket Handlers ---
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let client_id = format!("ws-{}", Uuid::new_v4().simple());
    info!("WebSocket upgrade request (/mcpi) from client {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, client_id: String) {
    info!("WebSocket client connected: {}", client_id);
    state.active_ws_connections.fetch_add(1, Ordering::SeqCst);

    loop {
        match socket.recv().await {
            Some(Ok(msg)) => {
                if !process_ws_message(msg, &mut socket, &state, &client_id).await {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("WS recv error from {}: {}", client_id, e);
                break;
            }
            None => break,
        }
    }

    info!("WebSocket client disconnected: {}", client_id);
    state.active_ws_connections.fetch_sub(1, Ordering::SeqCst);
}

/// Returns false when the connection should close.
async fn process_ws_message(msg: Message, socket: &mut WebSocket, state: &Arc<AppState>, client_id: &str) -> bool {
    match msg {
        Message::Text(text) => {
            state.request_count.fetch_add(1, Ordering::SeqCst);
            if let Some(response) = state.message_handler.handle_message(text, client_id.to_string()).await {
                if socket.send(Message::Text(response)).await.is_err() {
                    return false;
                }
            }
        }
        Message::Binary(_) => warn!("Unexpected binary message from {}", client_id),
        Message::Ping(data) => {
            if socket.send(Message::Pong(data)).await.is_err() {
                return false;
            }
        }
        Message::Pong(_) => {}
        Message::Close(_) => return false,
    }
    true
}

// --- Discovery ---
async fn discovery_handler(State(state): State<Arc<AppState>>) -> Json<DiscoveryResponse> {
    state.request_count.fetch_add(1, Ordering::SeqCst);
    let capabilities = state
        .rpc
        .registry
        .get_all_plugins()
        .iter()
        .map(|p| CapabilityDescription {
            name: p.name().to_string(),
            description: p.description().to_string(),
            category: p.category().to_string(),
            operations: p.supported_operations(),
        })
        .collect();

    Json(DiscoveryResponse { provider: state.rpc.provider.clone(), mode: "active".to_string(), capabilities })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use reqwest::Client;
    use serde_json::{json, Value};
    use sky_common::Provider;
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

    async fn serve() -> SocketAddr {
        let rpc = Arc::new(RpcContext {
            registry: Arc::new(PluginRegistry::new()),
            provider: Provider { name: "Sky".into(), domain: "sky.test".into(), description: "Test sky.".into() },
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(AppState::new(rpc)).into_make_service()).await.unwrap();
        });
        addr
    }

    fn initialize() -> String {
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2025-03-26", "capabilities": {}, "clientInfo": {"name": "t", "version": "1"}
        }})
        .to_string()
    }

    #[tokio::test]
    async fn http_session_lifecycle() {
        let addr = serve().await;
        let mcp = format!("http://{}/mcp", addr);
        let http = Client::new();

        let resp = http.post(&mcp).body(initialize()).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let session = resp.headers().get(MCP_SESSION_ID_HEADER).unwrap().to_str().unwrap().to_string();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["result"]["serverInfo"]["name"], json!("Sky"));

        // Only notifications: nothing to answer
        let resp = http
            .post(&mcp)
            .header(MCP_SESSION_ID_HEADER, &session)
            .body(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);

        // Requests after initialize carry no new session id
        let resp = http
            .post(&mcp)
            .header(MCP_SESSION_ID_HEADER, &session)
            .body(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert!(resp.headers().get(MCP_SESSION_ID_HEADER).is_none());

        let resp = http.get(&mcp).header(MCP_SESSION_ID_HEADER, &session).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
        drop(resp);

        let resp = http.delete(&mcp).header(MCP_SESSION_ID_HEADER, &session).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let resp = http.delete(&mcp).header(MCP_SESSION_ID_HEADER, &session).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        let resp = http.get(&mcp).header(MCP_SESSION_ID_HEADER, &session).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn session_header_is_required_for_get_and_delete() {
        let addr = serve().await;
        let mcp = format!("http://{}/mcp", addr);
        let http = Client::new();

        assert_eq!(http.get(&mcp).send().await.unwrap().status().as_u16(), 400);
        assert_eq!(http.delete(&mcp).send().await.unwrap().status().as_u16(), 400);
    }

    #[tokio::test]
    async fn websocket_answers_text_frames() {
        let addr = serve().await;
        let (mut ws, _) = connect_async(format!("ws://{}/mcpi", addr)).await.unwrap();

        ws.send(WsMessage::text(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string())).await.unwrap();
        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => break text.to_string(),
                _ => continue,
            }
        };
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["id"], json!(7));
        assert_eq!(reply["result"], json!({}));
        ws.close(None).await.unwrap();
    }

    #[test]
    fn idle_sessions_are_pruned() {
        let mut sessions = HashMap::new();
        sessions.insert("old".to_string(), HttpSessionInfo::new());
        let mut fresh = HttpSessionInfo::new();
        let later = Instant::now() + SESSION_IDLE_TIMEOUT + Duration::from_secs(1);
        fresh.last_seen = later;
        sessions.insert("fresh".to_string(), fresh);

        prune_idle_sessions(&mut sessions, later);
        assert!(sessions.contains_key("fresh"));
        assert!(!sessions.contains_key("old"));
    }
}
