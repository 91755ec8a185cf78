/**
 * KIBRA DASHBOARD - Point d'entrée du serveur
 *
 * RÔLE : Charge la config, construit la session, lance les deux boucles
 * de polling (noeuds, baux) puis sert les vues HTTP.
 */

use anyhow::Context;
use kibra_dashboard::http::{build_router, AppState};
use kibra_dashboard::{load_config, Session};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kibra_dashboard=info")),
        )
        .init();

    let cfg = load_config().await;
    tracing::info!(
        "[dashboard] border router {}:{} (control {})",
        cfg.border_router.host,
        cfg.border_router.port,
        cfg.border_router.control_port
    );

    let session = Session::new(&cfg).context("failed to build border router client")?;

    // premier chargement du formulaire, les pollers font le reste
    if let Err(e) = session.load_config().await {
        tracing::warn!("[dashboard] initial config load failed: {e}");
    }
    let _pollers = session.spawn_pollers();

    let app_state = AppState {
        session,
        api_key: cfg.api_key.clone(),
        refresh_secs: cfg.polling.nodes_period().as_secs().max(1),
    };
    let app = build_router(app_state);

    let listener = TcpListener::bind(cfg.listen.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    tracing::info!("[dashboard] listening on http://{}", cfg.listen);
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
