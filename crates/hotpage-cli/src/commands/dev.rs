//! `hotpage dev` command implementation.
//!
//! ## Architecture
//!
//! ```text
//! watcher ──changes──▶ scheduler (blocking thread) ──▶ BundlerSession
//!                          │ swap                          │
//!                          ▼                               │
//!                   ServedArtifacts ◀── HTTP (httpPort)    │
//!                          LiveChannel ──▶ WebSocket (hmrPort, /__hmr)
//! ```
//!
//! The HTTP side only ever reads the last successful artifact set, so a
//! broken edit never changes what the browser can load.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use hotpage_core::hmr::HMR_PATH;
use hotpage_core::scheduler::CycleOutcome;
use hotpage_core::session::{Artifact, INDEX_URL};
use hotpage_core::{
    ArtifactSet, BuildMode, BuildOptions, BundlerSession, EntrySet, LiveChannel, ProjectWatcher,
    Scheduler, SchedulerEvent, ServedArtifacts,
};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Dev server action. `None` fields fall back to the config file.
#[derive(Debug, Clone)]
pub struct DevAction {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    pub mode: Option<BuildMode>,
    pub port: Option<u16>,
    pub hmr_port: Option<u16>,
    pub host: Option<String>,
}

/// Run the dev server until Ctrl+C.
pub async fn run(action: DevAction) -> Result<()> {
    let project = super::load_project(&action.cwd, action.config.as_deref(), action.mode)?;
    let root = project.root;
    let mut config = project.config;
    if let Some(port) = action.port {
        config = config.with_http_port(port);
    }
    if let Some(port) = action.hmr_port {
        config = config.with_hmr_port(port);
    }
    if let Some(host) = action.host {
        config = config.with_host(host);
    }

    // Layout problems are fatal before anything is served.
    let entry_options = config.entry_options(&root);
    let entries = EntrySet::generate(&root, &entry_options).into_diagnostic()?;
    let pages_dir = entry_options.pages_dir.clone();
    info!(
        routes = entries.routes.len(),
        pages = %pages_dir.display(),
        mode = config.mode.as_str(),
        "entry set generated"
    );

    let session = BundlerSession::start(&root, entries, BuildOptions::from_config(&config));
    let served = Arc::new(ServedArtifacts::default());
    let channel = Arc::new(LiveChannel::new(0));
    let mut scheduler = Scheduler::new(
        &root,
        entry_options,
        session,
        Arc::clone(&served),
        Arc::clone(&channel),
    )
    .with_debounce(Duration::from_millis(config.debounce_ms));

    if let CycleOutcome::Failed { message } = scheduler.initial_build() {
        warn!(error = %message, "initial build failed, waiting for a fix");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = ProjectWatcher::start(
        &root,
        &pages_dir,
        Some(config.out_path(&root)),
        tx.clone(),
    )
    .into_diagnostic()?;
    let scheduler_task = tokio::task::spawn_blocking(move || scheduler.run(rx));

    let http_addr = bind_addr(&config.host, config.http_port)?;
    let hmr_addr = bind_addr(&config.host, config.hmr_port)?;
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .into_diagnostic()?;
    let hmr_listener = tokio::net::TcpListener::bind(hmr_addr)
        .await
        .into_diagnostic()?;

    println!();
    println!("  Dev server running at http://{}:{}", config.host, config.http_port);
    println!("  Live updates on ws://{}:{}{HMR_PATH}", config.host, config.hmr_port);
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let http = async move { axum::serve(http_listener, http_router(served)).await };
    let hmr = async move { axum::serve(hmr_listener, hmr_router(channel)).await };

    let outcome = tokio::select! {
        res = http => res.into_diagnostic(),
        res = hmr => res.into_diagnostic(),
        _ = signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    };

    drop(watcher);
    let _ = tx.send(SchedulerEvent::Shutdown);
    scheduler_task.await.into_diagnostic()?;
    outcome
}

fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = if host == "localhost" { "127.0.0.1" } else { host };
    format!("{ip}:{port}").parse().into_diagnostic()
}

// ============================================================================
// HTTP
// ============================================================================

fn http_router(served: Arc<ServedArtifacts>) -> Router {
    Router::new()
        .fallback(serve_artifact)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(served)
}

async fn serve_artifact(State(served): State<Arc<ServedArtifacts>>, uri: Uri) -> Response {
    let set = served.load();
    if set.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "No successful build yet. See the dev server output.",
        )
            .into_response();
    }
    match lookup(&set, uri.path()) {
        Some(artifact) => (
            [
                (header::CONTENT_TYPE, artifact.content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            artifact.bytes.clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Artifact for a request path. Extensionless paths that match nothing are
/// client-side routes and get the HTML shell.
fn lookup<'a>(set: &'a ArtifactSet, path: &str) -> Option<&'a Artifact> {
    if path == "/" {
        return set.get(INDEX_URL);
    }
    if let Some(artifact) = set.get(path) {
        return Some(artifact);
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    if last.contains('.') {
        None
    } else {
        set.get(INDEX_URL)
    }
}

// ============================================================================
// Live updates
// ============================================================================

#[derive(Debug, Deserialize)]
struct HmrQuery {
    generation: Option<u64>,
}

fn hmr_router(channel: Arc<LiveChannel>) -> Router {
    Router::new()
        .route(HMR_PATH, get(hmr_websocket))
        .with_state(channel)
}

async fn hmr_websocket(
    ws: WebSocketUpgrade,
    Query(query): Query<HmrQuery>,
    State(channel): State<Arc<LiveChannel>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_hmr_socket(socket, channel, query.generation))
}

/// Bridge one browser to the live channel until either side goes away.
async fn handle_hmr_socket(socket: WebSocket, channel: Arc<LiveChannel>, generation: Option<u64>) {
    let (id, mut updates) = channel.connect(generation);
    let (mut sender, mut receiver) = socket.split();

    let mut forward = tokio::spawn(async move {
        while let Some(message) = updates.recv().await {
            if sender.send(Message::Text(message.to_json())).await.is_err() {
                break;
            }
        }
    });

    // Clients never send anything we act on; reading detects the close.
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
    channel.disconnect(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> ArtifactSet {
        let mut set = ArtifactSet::new(3);
        set.insert(INDEX_URL, "<html></html>");
        set.insert("/pages/index.tsx", "export default 1;");
        set.insert("/routes.json", "[]");
        set
    }

    #[test]
    fn test_lookup_exact_and_root() {
        let set = set();
        assert_eq!(lookup(&set, "/").unwrap().text(), Some("<html></html>"));
        assert_eq!(
            lookup(&set, "/pages/index.tsx").unwrap().text(),
            Some("export default 1;")
        );
        assert_eq!(lookup(&set, "/routes.json").unwrap().content_type, "application/json");
    }

    #[test]
    fn test_lookup_falls_back_to_shell_for_routes() {
        let set = set();
        assert_eq!(lookup(&set, "/blog/hello").unwrap().text(), Some("<html></html>"));
        assert_eq!(lookup(&set, "/about/").unwrap().text(), Some("<html></html>"));
        assert!(lookup(&set, "/missing.js").is_none());
    }

    #[test]
    fn test_bind_addr() {
        assert_eq!(bind_addr("localhost", 3000).unwrap().to_string(), "127.0.0.1:3000");
        assert_eq!(bind_addr("0.0.0.0", 8080).unwrap().port(), 8080);
        assert!(bind_addr("not a host", 1).is_err());
    }
}
