/*!
Stub HTTP du border router KiBRA

Sert `/db/nodes`, `/db/leases` et `/db/cfg` sur un port local éphémère.
Le même port joue le rôle du port web et du port de contrôle (POST /db/cfg).
Enregistre toutes les requêtes et les soumissions de configuration, et
permet de simuler une panne (statut HTTP) ou un corps JSON tronqué.
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Comportement des réponses du stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    Healthy,
    /// Toutes les routes répondent ce statut HTTP
    Failing(u16),
    /// Les GET renvoient un JSON tronqué
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
}

struct StubState {
    nodes: Value,
    leases: Value,
    config: Value,
    mode: StubMode,
    submissions: Vec<Value>,
    requests: Vec<StubRequest>,
}

#[derive(Clone)]
pub struct StubBorderRouter {
    inner: Arc<Mutex<StubState>>,
    addr: SocketAddr,
    handle: Arc<JoinHandle<()>>,
}

impl StubBorderRouter {
    /// Démarre le stub sur 127.0.0.1 avec un port libre.
    pub async fn start() -> Result<Self> {
        let inner = Arc::new(Mutex::new(StubState {
            nodes: json!({ "nodes": [] }),
            leases: json!({ "leases": [] }),
            config: json!({}),
            mode: StubMode::Healthy,
            submissions: Vec::new(),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/db/nodes", get(get_nodes))
            .route("/db/leases", get(get_leases))
            .route("/db/cfg", get(get_config).post(post_config))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[STUB] server stopped: {}", e);
            }
        });

        log::info!("🛰️ [STUB] border router listening on {}", addr);
        Ok(Self { inner, addr, handle: Arc::new(handle) })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Document complet servi par `/db/nodes` (ex: `{"nodes": [...]}`)
    pub fn set_nodes(&self, document: Value) {
        self.inner.lock().unwrap().nodes = document;
    }

    pub fn set_leases(&self, document: Value) {
        self.inner.lock().unwrap().leases = document;
    }

    pub fn set_config(&self, document: Value) {
        self.inner.lock().unwrap().config = document;
    }

    pub fn config(&self) -> Value {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn set_mode(&self, mode: StubMode) {
        log::info!("🔧 [STUB] mode -> {:?}", mode);
        self.inner.lock().unwrap().mode = mode;
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn last_submission(&self) -> Option<Value> {
        self.inner.lock().unwrap().submissions.last().cloned()
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Nombre de requêtes reçues sur un chemin (toutes méthodes)
    pub fn request_count(&self, path: &str) -> usize {
        self.inner.lock().unwrap().requests.iter().filter(|r| r.path == path).count()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

type Shared = Arc<Mutex<StubState>>;

fn serve_document(state: &Shared, path: &str, pick: fn(&StubState) -> Value) -> Response {
    let mut st = state.lock().unwrap();
    st.requests.push(StubRequest { method: "GET".into(), path: path.into() });
    match st.mode {
        StubMode::Healthy => Json(pick(&st)).into_response(),
        StubMode::Failing(code) => failure(code),
        StubMode::Malformed => {
            ([(header::CONTENT_TYPE, "application/json")], "{\"truncated\": [").into_response()
        }
    }
}

fn failure(code: u16) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, "simulated outage").into_response()
}

async fn get_nodes(State(state): State<Shared>) -> Response {
    serve_document(&state, "/db/nodes", |st| st.nodes.clone())
}

async fn get_leases(State(state): State<Shared>) -> Response {
    serve_document(&state, "/db/leases", |st| st.leases.clone())
}

async fn get_config(State(state): State<Shared>) -> Response {
    serve_document(&state, "/db/cfg", |st| st.config.clone())
}

async fn post_config(State(state): State<Shared>, Json(document): Json<Value>) -> Response {
    let mut st = state.lock().unwrap();
    st.requests.push(StubRequest { method: "POST".into(), path: "/db/cfg".into() });
    if let StubMode::Failing(code) = st.mode {
        return failure(code);
    }
    log::info!("📥 [STUB] configuration submitted: {} keys", document.as_object().map_or(0, |o| o.len()));
    st.submissions.push(document.clone());
    // remplacement complet, pas de fusion
    st.config = document;
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_and_records() {
        let stub = StubBorderRouter::start().await.unwrap();
        stub.set_nodes(json!({"nodes": [{"rloc16": "0400"}]}));

        let body: Value = reqwest::get(format!("{}/db/nodes", stub.base_url())).await.unwrap().json().await.unwrap();
        assert_eq!(body["nodes"][0]["rloc16"], "0400");
        assert_eq!(stub.request_count("/db/nodes"), 1);

        let client = reqwest::Client::new();
        let res = client
            .post(format!("{}/db/cfg", stub.base_url()))
            .json(&json!({"action_dhcp": "start"}))
            .send()
            .await
            .unwrap();
        assert!(res.status().is_success());
        assert_eq!(stub.last_submission().unwrap()["action_dhcp"], "start");
        assert_eq!(stub.config(), json!({"action_dhcp": "start"}));
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let stub = StubBorderRouter::start().await.unwrap();

        stub.set_mode(StubMode::Failing(503));
        let res = reqwest::get(format!("{}/db/leases", stub.base_url())).await.unwrap();
        assert_eq!(res.status().as_u16(), 503);

        stub.set_mode(StubMode::Malformed);
        let res = reqwest::get(format!("{}/db/cfg", stub.base_url())).await.unwrap();
        assert!(res.status().is_success());
        assert!(res.json::<Value>().await.is_err());
    }
}
