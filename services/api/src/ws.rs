use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use textbook_core::{InboundMessage, Pipeline, SessionController, SessionState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

/// How long teardown waits for queued events to reach the client.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Builds the application router: `/ws`, `/health` and the static `/media` tree.
pub fn router(state: AppState, media_dir: &Path) -> Router {
    // Permissive CORS so a separately hosted frontend can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Handles WebSocket upgrade requests.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state.pipeline))
}

/// Runs one client session.
///
/// A spawned drain task forwards the Output Channel to the socket as JSON text frames while this
/// task feeds inbound control messages to the `SessionController`.
async fn handle_socket(socket: WebSocket, pipeline: Arc<Pipeline>) {
    info!("WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let (mut controller, mut output) = SessionController::new(pipeline);

    let mut drain = tokio::spawn(async move {
        while let Some(event) = output.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize {} event: {}", event.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                tracing::debug!("Client went away while sending");
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match InboundMessage::parse(text.as_str()) {
                Ok(message) => {
                    if controller.handle(message).await == SessionState::Closed {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Ignoring non-JSON frame from client: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => { /* Ignore binary and Ping/Pong */ }
            Err(e) => {
                info!("WebSocket error: {}", e);
                break;
            }
        }
    }

    controller.disconnect().await;
    if tokio::time::timeout(DRAIN_GRACE, &mut drain).await.is_err() {
        tracing::warn!("Output drain did not finish in time; aborting it");
        drain.abort();
    }
    info!("WebSocket connection closed");
}
