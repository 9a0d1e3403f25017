//! Local stand-in for the remote episode host
//!
//! Serves in-memory files at `http://127.0.0.1:<port>/audio/<name>` and
//! counts every request, so tests can assert how many physical fetches
//! happened. Unknown names answer 404.

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct HostState {
    files: Arc<HashMap<String, Vec<u8>>>,
    hits: Arc<AtomicUsize>,
    delay: Duration,
}

pub struct EpisodeHost {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl EpisodeHost {
    /// Start serving `files`; every response is delayed by `delay`
    pub async fn start(files: HashMap<String, Vec<u8>>, delay: Duration) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = HostState {
            files: Arc::new(files),
            hits: Arc::clone(&hits),
            delay,
        };

        let app = Router::new()
            .route("/audio/:name", get(serve_file))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self, name: &str) -> String {
        format!("http://{}/audio/{}", self.addr, name)
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for EpisodeHost {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_file(State(state): State<HostState>, Path(name): Path<String>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;

    match state.files.get(&name) {
        Some(bytes) => (StatusCode::OK, Body::from(bytes.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
