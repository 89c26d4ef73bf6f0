//! Browser-backed display.
//!
//! The HTTP/WebSocket server runs on its own tokio runtime. The viewer loop
//! stays synchronous: interactive events reach it over a std channel that
//! [`DisplayServer::poll`] drains with a bounded wait, and every redraw
//! publishes the scene to connected sockets.

use super::scene::{Scene, SceneFrame};
use super::{DisplayCommand, Renderer, ViewEvent};
use crate::config::DisplayConfig;
use crate::snapshot::FieldStats;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

/// Errors starting the display server.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to start display runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to bind display server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>snapview</title></head>
<body>
<pre id="scene">connecting...</pre>
<script>
const ws = new WebSocket(`ws://${location.host}/ws`);
ws.onmessage = (m) => {
  document.getElementById("scene").textContent = JSON.stringify(JSON.parse(m.data), null, 2);
};
</script>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    scene: Arc<RwLock<Scene>>,
    frames: broadcast::Sender<SceneFrame>,
    events: Sender<ViewEvent>,
}

fn read_scene(scene: &RwLock<Scene>) -> RwLockReadGuard<'_, Scene> {
    scene.read().unwrap_or_else(|e| e.into_inner())
}

fn write_scene(scene: &RwLock<Scene>) -> RwLockWriteGuard<'_, Scene> {
    scene.write().unwrap_or_else(|e| e.into_inner())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/scene", get(api_scene))
        .route("/api/events", post(api_event))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// [`Renderer`] that serves the scene to browsers.
pub struct DisplayServer {
    // Dropping the runtime stops the server, so it lives as long as we do.
    _runtime: tokio::runtime::Runtime,
    scene: Arc<RwLock<Scene>>,
    frames: broadcast::Sender<SceneFrame>,
    events: Receiver<ViewEvent>,
    started: Instant,
    local_addr: SocketAddr,
}

impl DisplayServer {
    /// Bind the listener and start serving in the background.
    pub fn start(config: &DisplayConfig) -> Result<Self, DisplayError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("snapview-display")
            .enable_all()
            .build()
            .map_err(DisplayError::Runtime)?;

        let addr = format!("{}:{}", config.bind, config.port);
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(&addr))
            .map_err(|e| DisplayError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DisplayError::Bind { addr, source: e })?;

        let (event_tx, event_rx) = mpsc::channel();
        let (frames, _) = broadcast::channel(16);
        let scene = Arc::new(RwLock::new(Scene::new()));

        let app = router(AppState {
            scene: Arc::clone(&scene),
            frames: frames.clone(),
            events: event_tx,
        });

        runtime.spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "display server stopped");
            }
        });
        tracing::info!("display listening on {local_addr}");

        Ok(Self {
            _runtime: runtime,
            scene,
            frames,
            events: event_rx,
            started: Instant::now(),
            local_addr,
        })
    }

    #[cfg(test)]
    fn frame(&self) -> SceneFrame {
        read_scene(&self.scene).frame()
    }
}

impl Renderer for DisplayServer {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn poll(&mut self, timeout: Duration) -> bool {
        let first = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
        };

        let mut scene = write_scene(&self.scene);
        scene.apply_event(first);
        let mut applied = 1;
        while let Ok(event) = self.events.try_recv() {
            scene.apply_event(event);
            applied += 1;
        }
        tracing::debug!(applied, "view events applied");
        true
    }

    fn command(&mut self, command: DisplayCommand) {
        write_scene(&self.scene).apply_command(command);
    }

    fn force_redraw(&mut self, budget: usize) -> usize {
        let (flushed, frame) = {
            let mut scene = write_scene(&self.scene);
            let flushed = scene.flush(budget);
            (flushed, scene.frame())
        };
        // No receivers just means no browser is connected
        let _ = self.frames.send(frame);
        flushed
    }

    fn set_color_ranges(&mut self, stats: &[FieldStats]) {
        write_scene(&self.scene).set_color_ranges(stats);
    }

    fn set_time(&mut self, t: f64) {
        write_scene(&self.scene).set_time(t);
    }

    fn url(&self) -> String {
        let host = if self.local_addr.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            self.local_addr.ip().to_string()
        };
        format!("http://{}:{}", host, self.local_addr.port())
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn api_scene(State(state): State<AppState>) -> Json<SceneFrame> {
    Json(read_scene(&state.scene).frame())
}

async fn api_event(State(state): State<AppState>, Json(event): Json<ViewEvent>) -> StatusCode {
    match state.events.send(event) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut frames = state.frames.subscribe();

    let current = read_scene(&state.scene).frame();
    if send_frame(&mut sender, &current).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if send_frame(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "socket lagging, skipping frames");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ViewEvent>(text.as_str()) {
                        Ok(event) => {
                            if state.events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "ignoring malformed view event"),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_frame(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    frame: &SceneFrame,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode scene frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
