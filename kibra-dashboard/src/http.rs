/**
 * API HTTP DASHBOARD - Vues servies au navigateur
 *
 * RÔLE :
 * Expose les rendus de la session (graphe SVG, tableaux HTML, formulaire de
 * configuration) et leurs miroirs JSON.
 *
 * ROUTES :
 * - /health, /, /network, /network/graph.svg, /network/table, /leases
 * - /network/nodes/{rloc16} (panneau d'info), .../pin, .../release, /network/labels
 * - /config (GET formulaire, POST soumission urlencoded)
 * - /api/nodes, /api/links, /api/leases, /api/layout, /api/notification
 *
 * SÉCURITÉ :
 * Si une clé API est configurée, le header x-api-key est exigé sur toutes
 * les requêtes POST. Les lectures restent ouvertes.
 */

use crate::form::{FormError, FormState};
use crate::force::{node_info, LabelMode, Placement};
use crate::models::{Lease, Node};
use crate::notify::Notification;
use crate::session::{Session, SessionError};
use crate::table::escape;
use crate::topology::Link;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use std::fmt::Write;

#[derive(Clone)]
pub struct AppState {
    pub session: Session,
    pub api_key: Option<String>,
    pub refresh_secs: u64,
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };
    if req.method() != Method::POST {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        tracing::warn!("[http] rejected {} {}: bad or missing x-api-key", req.method(), req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/", get(index))
        .route("/network", get(network_page))
        .route("/network/graph.svg", get(graph_svg))
        .route("/network/table", get(network_table))
        .route("/network/nodes/{rloc16}", get(node_panel))
        .route("/network/nodes/{rloc16}/pin", post(pin_node))
        .route("/network/nodes/{rloc16}/release", post(release_node))
        .route("/network/labels", post(toggle_labels))
        .route("/leases", get(leases_page))
        .route("/config", get(config_page).post(submit_config))
        .route("/api/nodes", get(api_nodes))
        .route("/api/links", get(api_links))
        .route("/api/leases", get(api_leases))
        .route("/api/layout", get(api_layout))
        .route("/api/notification", get(api_notification))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

fn page(app: &AppState, title: &str, refresh: bool, body: &str) -> Html<String> {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    if refresh {
        let _ = writeln!(html, "<meta http-equiv=\"refresh\" content=\"{}\">", app.refresh_secs);
    }
    let _ = write!(
        html,
        "<title>KiBRA - {0}</title>\n</head>\n<body>\n<nav><a href=\"/network\">Network</a> \
         <a href=\"/leases\">Leases</a> <a href=\"/config\">Configuration</a></nav>\n<h1>{0}</h1>\n",
        escape(title)
    );
    if let Some(banner) = app.session.notifier().current() {
        let _ = writeln!(html, "<p class=\"legend\">{}</p>", escape(&banner.message));
    }
    html.push_str(body);
    html.push_str("</body>\n</html>\n");
    Html(html)
}

// GET /
async fn index(State(app): State<AppState>) -> Html<String> {
    let (nodes, leases) = {
        let st = app.session.state().lock();
        (st.topology.devices().count(), st.leases.leases().len())
    };
    let body = format!(
        "<ul>\n<li><a href=\"/network\">Network</a> ({nodes} nodes)</li>\n\
         <li><a href=\"/leases\">DHCPv6 leases</a> ({leases} leases)</li>\n\
         <li><a href=\"/config\">Configuration</a></li>\n</ul>\n"
    );
    page(&app, "Border router", false, &body)
}

// GET /network (graphe + tableau)
async fn network_page(State(app): State<AppState>) -> Html<String> {
    let body = {
        let mut st = app.session.state().lock();
        let graph = st.render_graph();
        let table = st.node_table.render_html();
        format!("<div id=\"forcediv\">\n{graph}</div>\n<div id=\"tablediv\">\n{table}</div>\n")
    };
    page(&app, "Network", true, &body)
}

async fn graph_svg(State(app): State<AppState>) -> impl IntoResponse {
    let svg = app.session.state().lock().render_graph();
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}

async fn network_table(State(app): State<AppState>) -> Html<String> {
    Html(app.session.state().lock().node_table.render_html())
}

// GET /network/nodes/{rloc16}
async fn node_panel(State(app): State<AppState>, Path(rloc16): Path<String>) -> Result<Html<String>, StatusCode> {
    let st = app.session.state().lock();
    let node = st.topology.node(&rloc16).ok_or(StatusCode::NOT_FOUND)?;
    node_info(node).map(Html).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct PinParams {
    x: f64,
    y: f64,
}

// POST /network/nodes/{rloc16}/pin?x=&y= (début de drag)
async fn pin_node(
    State(app): State<AppState>,
    Path(rloc16): Path<String>,
    Query(params): Query<PinParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !app.session.pin(&rloc16, params.x, params.y) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "rloc16": rloc16, "fixed": true })))
}

// POST /network/nodes/{rloc16}/release (double-clic)
async fn release_node(
    State(app): State<AppState>,
    Path(rloc16): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !app.session.release(&rloc16) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "rloc16": rloc16, "fixed": false })))
}

async fn toggle_labels(State(app): State<AppState>) -> Json<serde_json::Value> {
    let mode: LabelMode = app.session.toggle_labels();
    let message = app.session.notifier().last_message();
    Json(serde_json::json!({ "labels": mode, "message": message }))
}

// GET /leases
async fn leases_page(State(app): State<AppState>) -> Html<String> {
    let body = {
        let table = app.session.state().lock().lease_table.render_html();
        format!("<div id=\"leasesdiv\">\n{table}</div>\n")
    };
    page(&app, "DHCPv6 leases", true, &body)
}

// GET /config : recharge le document si la page vient d'être (re)demandée
async fn config_page(State(app): State<AppState>) -> Html<String> {
    let stale = matches!(
        app.session.state().lock().form.state(),
        FormState::Loading | FormState::ReloadScheduled { .. }
    );
    if stale {
        let _ = app.session.load_config().await;
    }
    render_form(&app)
}

fn render_form(app: &AppState) -> Html<String> {
    let form = app.session.state().lock().form.render_html();
    page(app, "Configuration", false, &form)
}

// POST /config (application/x-www-form-urlencoded)
async fn submit_config(State(app): State<AppState>, Form(edits): Form<Vec<(String, String)>>) -> Response {
    let status = match app.session.submit_config(edits).await {
        Ok(_) => StatusCode::OK,
        Err(SessionError::Form(FormError::Invalid(_))) => StatusCode::UNPROCESSABLE_ENTITY,
        Err(SessionError::Form(FormError::InvalidState { .. })) => StatusCode::CONFLICT,
        Err(_) => StatusCode::BAD_GATEWAY,
    };
    (status, render_form(&app)).into_response()
}

// GET /api/*
async fn api_nodes(State(app): State<AppState>) -> Json<Vec<Node>> {
    Json(app.session.state().lock().topology.nodes().iter().cloned().collect())
}

async fn api_links(State(app): State<AppState>) -> Json<Vec<Link>> {
    Json(app.session.state().lock().topology.links().iter().cloned().collect())
}

async fn api_leases(State(app): State<AppState>) -> Json<Vec<Lease>> {
    Json(app.session.state().lock().leases.leases().iter().cloned().collect())
}

async fn api_layout(State(app): State<AppState>) -> Json<Vec<Placement>> {
    let st = app.session.state().lock();
    Json(st.layout.placements(&st.topology))
}

async fn api_notification(State(app): State<AppState>) -> Json<Option<Notification>> {
    Json(app.session.notifier().current())
}
