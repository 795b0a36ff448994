#![deny(missing_docs)]
//! # Node
//!
//! Wraps the pre-ranking engine in an executable: spawns the engine and
//! serves the read-only operational surface plus the debug flush trigger
//! over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use preranker_engine::{Coordinator, Engine, StatusHandle, StatusSnapshot};
use preranker_storage::KeyValueStore;
use std::net::SocketAddr;
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::oneshot,
};

/// Shared state of the HTTP handlers.
pub struct AppState<S>
where
    S: KeyValueStore + Clone,
{
    coordinator: Coordinator<S>,
    status: StatusHandle,
}

impl<S> Clone for AppState<S>
where
    S: KeyValueStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            status: self.status.clone(),
        }
    }
}

/// Spawn the engine and serve the operational surface.
///
/// - Takes the engine to run.
/// - Address to bind to.
/// - A channel that returns the actual chosen local address.
/// - An optional channel that can be used to shut the node down.
pub async fn run<S, A>(
    engine: Engine<S>,
    addr: A,
    local_addr: oneshot::Sender<SocketAddr>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
) -> anyhow::Result<()>
where
    A: ToSocketAddrs,
    S: KeyValueStore + Clone,
{
    let handle = engine.spawn().await?;
    let state = AppState {
        coordinator: handle.coordinator(),
        status: handle.status(),
    };

    let app = Router::new()
        .route("/", get(health_check))
        .route("/status", get(status::<S>))
        .route("/flush/:intent_id", post(flush::<S>))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;

    // Send the local address to the caller; useful when the port is chosen
    // by the OS.
    let addr = listener.local_addr()?;
    local_addr
        .send(addr)
        .map_err(|_| anyhow::anyhow!("failed to send local address"))?;

    match shutdown_rx {
        Some(rx) => {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await?
        }
        None => axum::serve(listener, app).await?,
    }

    // After the server is done, shut the engine down.
    handle.shutdown().await?;
    Ok(())
}

async fn health_check() {}

async fn status<S>(State(state): State<AppState<S>>) -> Json<StatusSnapshot>
where
    S: KeyValueStore + Clone,
{
    Json(state.status.snapshot())
}

async fn flush<S>(
    State(state): State<AppState<S>>,
    Path(intent_id): Path<String>,
) -> impl IntoResponse
where
    S: KeyValueStore + Clone,
{
    if state.coordinator.flush(&intent_id).await {
        Json(serde_json::json!({ "flushed": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "intent is not active" })),
        )
            .into_response()
    }
}
