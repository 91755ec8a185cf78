use kibra_dashboard::config::load_config_from;
use kibra_dashboard::http::{build_router, AppState};
use kibra_dashboard::session::NODES_UNREACHABLE;
use kibra_dashboard::Session;
use kibra_devkit::{KibraFixtures, StubMode, TestHarness};
use reqwest::StatusCode;
use serde_json::Value;
use std::io::Write;

struct Dashboard {
    harness: TestHarness,
    session: Session,
    url: String,
    http: reqwest::Client,
}

async fn start(api_key: Option<&str>) -> Dashboard {
    let harness = TestHarness::new().await.unwrap();
    harness.stub.set_nodes(KibraFixtures::small_mesh());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(harness.dashboard_yaml().as_bytes()).unwrap();
    let cfg = load_config_from(file.path()).await;
    let session = Session::new(&cfg).unwrap();
    session.refresh_nodes().await.unwrap();

    let app = build_router(AppState {
        session: session.clone(),
        api_key: api_key.map(str::to_string),
        refresh_secs: 5,
    });
    let listener = tokio::net::TcpListener::bind(cfg.listen.as_str()).await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Dashboard { harness, session, url, http: reqwest::Client::new() }
}

impl Dashboard {
    async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(format!("{}{path}", self.url)).send().await.unwrap()
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.http.post(format!("{}{path}", self.url)).send().await.unwrap()
    }
}

#[tokio::test]
async fn network_views() {
    let dash = start(None).await;

    assert_eq!(dash.get("/health").await.text().await.unwrap(), "ok");

    let svg = dash.get("/network/graph.svg").await;
    assert_eq!(svg.headers()["content-type"], "image/svg+xml");
    let svg = svg.text().await.unwrap();
    assert!(svg.contains("marker-end=\"url(#good)\""));
    assert!(svg.contains("class=\"link child\""));

    let page = dash.get("/network").await.text().await.unwrap();
    assert!(page.contains("<meta http-equiv=\"refresh\" content=\"5\">"));
    assert!(page.contains("<table"));
    assert!(page.contains("0401"));

    let nodes: Vec<Value> = dash.get("/api/nodes").await.json().await.unwrap();
    assert_eq!(nodes.len(), 4);
    let links: Vec<Value> = dash.get("/api/links").await.json().await.unwrap();
    assert!(links.iter().any(|l| l["id"] == "0400cloud" && l["quality"] == "online"));
}

#[tokio::test]
async fn node_panel_and_drag() {
    let dash = start(None).await;

    let info = dash.get("/network/nodes/0800").await.text().await.unwrap();
    assert!(info.contains("router"));
    assert_eq!(dash.get("/network/nodes/cloud").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(dash.get("/network/nodes/ffff").await.status(), StatusCode::NOT_FOUND);

    assert_eq!(dash.post("/network/nodes/0800/pin?x=100&y=120").await.status(), StatusCode::OK);
    let layout: Vec<Value> = dash.get("/api/layout").await.json().await.unwrap();
    let pinned = layout.iter().find(|p| p["rloc16"] == "0800").unwrap();
    assert_eq!(pinned["fixed"], true);
    assert_eq!(pinned["x"], 100.0);

    assert_eq!(dash.post("/network/nodes/0800/release").await.status(), StatusCode::OK);
    assert!(!dash.session.state().lock().layout.is_pinned("0800"));
    assert_eq!(dash.post("/network/nodes/ffff/pin?x=1&y=1").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn label_toggle_shows_banner() {
    let dash = start(None).await;

    let body: Value = dash.post("/network/labels").await.json().await.unwrap();
    assert_eq!(body["message"], "Showing Router IDs.");

    let banner: Value = dash.get("/api/notification").await.json().await.unwrap();
    assert_eq!(banner["message"], "Showing Router IDs.");
    let page = dash.get("/network").await.text().await.unwrap();
    assert!(page.contains("<p class=\"legend\">Showing Router IDs.</p>"));
}

#[tokio::test]
async fn outage_banner_on_pages() {
    let dash = start(None).await;
    dash.harness.stub.set_mode(StubMode::Failing(503));
    assert!(dash.session.refresh_nodes().await.is_err());

    let page = dash.get("/network").await.text().await.unwrap();
    assert!(page.contains(NODES_UNREACHABLE));
    let nodes: Vec<Value> = dash.get("/api/nodes").await.json().await.unwrap();
    assert_eq!(nodes.len(), 4);
}

#[tokio::test]
async fn config_form_round_trip() {
    let dash = start(None).await;

    let form = dash.get("/config").await.text().await.unwrap();
    assert!(form.contains("<select id=\"action_dhcp\" name=\"action_dhcp\">"));
    assert!(form.contains("readonly"));

    let rejected = dash
        .http
        .post(format!("{}/config", dash.url))
        .form(&[("action_dhcp", "reboot")])
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(rejected.text().await.unwrap().contains("<p>Errors.</p>"));
    assert!(dash.harness.stub.submissions().is_empty());

    let accepted = dash
        .http
        .post(format!("{}/config", dash.url))
        .form(&[("action_dhcp", "start"), ("status_dhcp", "running")])
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    let body = accepted.text().await.unwrap();
    assert!(body.contains("<p>Number of elements: 15</p>"));
    assert!(body.contains("setTimeout"));
    dash.harness.assert_submitted("action_dhcp", &Value::from("start")).unwrap();
}

#[tokio::test]
async fn config_submit_upstream_failure_is_bad_gateway() {
    let dash = start(None).await;
    dash.get("/config").await;

    dash.harness.stub.set_mode(StubMode::Failing(500));
    let response = dash
        .http
        .post(format!("{}/config", dash.url))
        .form(&[("action_nat", "stop")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn api_key_guards_posts_only() {
    let dash = start(Some("secret")).await;

    assert_eq!(dash.get("/api/nodes").await.status(), StatusCode::OK);
    assert_eq!(dash.post("/network/labels").await.status(), StatusCode::UNAUTHORIZED);

    let allowed = dash
        .http
        .post(format!("{}/network/labels", dash.url))
        .header("x-api-key", "secret")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn reload_after_outage_does_not_loop() {
    let dash = start(None).await;
    dash.get("/config").await;
    let accepted = dash
        .http
        .post(format!("{}/config", dash.url))
        .form(&[("action_mdns", "start")])
        .send()
        .await
        .unwrap();
    assert!(accepted.text().await.unwrap().contains("setTimeout"));

    // le navigateur recharge pendant que le border router est tombé
    dash.harness.stub.set_mode(StubMode::Failing(503));
    let page = dash.get("/config").await.text().await.unwrap();
    assert!(!page.contains("setTimeout"), "{page}");
    assert!(page.contains("No access to configuration."));

    dash.harness.stub.set_mode(StubMode::Healthy);
    let again = dash.get("/config").await.text().await.unwrap();
    assert!(!again.contains("setTimeout"));
}
