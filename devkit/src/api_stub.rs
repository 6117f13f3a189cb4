/*!
Stub RabbitMQ management API for development without a broker

Binds a local HTTP server on an ephemeral port, answers registered paths with
canned JSON and records every request for assertions. Unregistered paths get
a 404 like the real management plugin.
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct StubState {
    responses: HashMap<String, (StatusCode, Value)>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<StubState>>;

pub struct MockManagementApi {
    port: u16,
    state: SharedState,
    server: JoinHandle<()>,
}

impl MockManagementApi {
    /// Start the stub on 127.0.0.1 with an OS-assigned port
    pub async fn start() -> Result<Self> {
        env_logger::try_init().ok();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let state = SharedState::default();
        let app = Router::new().fallback(serve).with_state(state.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[MOCK] management API stopped: {}", e);
            }
        });

        log::info!("[MOCK] management API listening on 127.0.0.1:{}", port);
        Ok(Self {
            port,
            state,
            server,
        })
    }

    pub fn host(&self) -> String {
        "127.0.0.1".to_string()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Answer `path` with 200 and `body`
    pub fn respond(&self, path: &str, body: Value) {
        self.respond_with_status(path, 200, body);
    }

    pub fn respond_with_status(&self, path: &str, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.state
            .lock()
            .responses
            .insert(path.to_string(), (status, body));
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }
}

impl Drop for MockManagementApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve(
    State(state): State<SharedState>,
    uri: Uri,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut state = state.lock();
    state.requests.push(RecordedRequest {
        path: path.clone(),
        authorization,
    });

    match state.responses.get(&path) {
        Some((status, body)) => {
            log::debug!("[MOCK] {} -> {}", path, status);
            (*status, Json(body.clone()))
        }
        None => {
            log::debug!("[MOCK] {} -> 404", path);
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Object Not Found", "reason": "Not Found"})),
            )
        }
    }
}
