// sky-server/src/admin.rs
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::AppState;

pub fn format_uptime(secs: u64) -> String {
    format!("{}d {}h {}m {}s", secs / 86400, (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
}

// Get server stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = state.startup_time.elapsed().as_secs();
    Json(json!({
        "uptime_secs": uptime_secs,
        "uptime_formatted": format_uptime(uptime_secs),
        "request_count": state.request_count.load(Ordering::SeqCst),
        "active_connections": state.active_ws_connections.load(Ordering::SeqCst),
        "http_sessions": state.http_sessions.read().await.len(),
        "plugin_count": state.rpc.registry.get_all_plugins().len(),
    }))
}

// Get plugins list
pub async fn get_plugins(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let plugins: Vec<serde_json::Value> = state
        .rpc
        .registry
        .get_all_plugins()
        .iter()
        .map(|plugin| {
            json!({
                "name": plugin.name(),
                "description": plugin.description(),
                "category": plugin.category(),
                "type": format!("{:?}", plugin.plugin_type()),
                "operations": plugin.supported_operations()
            })
        })
        .collect();

    Json(json!({ "plugins": plugins }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_human_readable() {
        assert_eq!(format_uptime(0), "0d 0h 0m 0s");
        assert_eq!(format_uptime(90061), "1d 1h 1m 1s");
    }
}
