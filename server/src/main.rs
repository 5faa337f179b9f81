use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use watchparty_server::comments::{self, CommentsCache};
use watchparty_server::registry::Registry;
use watchparty_server::ws::{self, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchparty_server=debug,info".into()),
        )
        .init();

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(3001);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let host_controls = env::var("WATCHPARTY_HOST_CONTROLS")
        .map(|val| !matches!(val.as_str(), "0" | "false" | "off"))
        .unwrap_or(true);

    let app_state = AppState {
        registry: Arc::new(Registry::new()),
        senders: Arc::new(RwLock::new(HashMap::new())),
        config: ServerConfig { host_controls },
        http: reqwest::Client::new(),
        comments: Arc::new(CommentsCache::new()),
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/comments/:video_id", get(comments::comments_endpoint))
        .route("/ws", get(ws::ws_endpoint))
        .with_state(app_state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "WatchParty server listening on {} (host controls: {})",
        addr,
        host_controls
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "rooms": state.registry.room_count(),
        "users": state.registry.participant_count(),
    }))
}
