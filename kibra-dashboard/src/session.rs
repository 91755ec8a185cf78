/**
 * SESSION DASHBOARD - État client explicite et cycles de rafraîchissement
 *
 * RÔLE :
 * Regroupe tout l'état du dashboard (topologie, mise en page, tableaux,
 * baux, formulaire, mode d'étiquette) derrière un seul mutex, plus le
 * client du border router et la bannière de notification.
 *
 * FONCTIONNEMENT :
 * - un cycle = fetch (hors verrou) puis fusion + re-rendu sous le verrou,
 *   deux fusions ne s'entrelacent jamais
 * - échec réseau / JSON invalide : bannière + warn, état inchangé
 * - le formulaire suit sa machine à états, le POST se fait hors verrou
 */

use crate::collection::ReconcileReport;
use crate::config::{DashboardConfig, PollingConf};
use crate::force::{ForceLayout, LabelMode, Viewport};
use crate::form::{ConfigForm, FormError};
use crate::leases::LeaseBook;
use crate::models::{Lease, Node};
use crate::notify::Notifier;
use crate::poller::{spawn_poller, BorderRouterClient, FetchError};
use crate::state::{new_state, Shared};
use crate::table::{lease_columns, node_columns, TableView};
use crate::topology::{LinkError, Topology, TopologyReport};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

pub const NODES_UNREACHABLE: &str = "No access to database.";
pub const LEASES_UNREACHABLE: &str = "No access to leases.";
pub const CONFIG_UNREACHABLE: &str = "No access to configuration.";
pub const INVALID_ROUTES: &str = "Invalid route cost in network data.";
pub const CONFIG_NOT_SAVED: &str = "Configuration not saved.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Form(#[from] FormError),
}

pub struct DashboardState {
    pub topology: Topology,
    pub layout: ForceLayout,
    pub node_table: TableView<Node>,
    pub leases: LeaseBook,
    pub lease_table: TableView<Lease>,
    pub form: ConfigForm,
    pub labels: LabelMode,
}

impl DashboardState {
    pub fn new(viewport: Viewport, reload_delay: Duration) -> Self {
        Self {
            topology: Topology::new(),
            layout: ForceLayout::new(viewport),
            node_table: TableView::new(node_columns()),
            leases: LeaseBook::new(),
            lease_table: TableView::new(lease_columns()),
            form: ConfigForm::new(reload_delay),
            labels: LabelMode::default(),
        }
    }

    pub fn render_graph(&self) -> String {
        self.layout.render_svg(&self.topology, self.labels)
    }
}

#[derive(Clone)]
pub struct Session {
    client: BorderRouterClient,
    state: Shared<DashboardState>,
    notifier: Notifier,
    polling: PollingConf,
}

impl Session {
    pub fn new(cfg: &DashboardConfig) -> Result<Self, FetchError> {
        let client = BorderRouterClient::new(&cfg.border_router, cfg.polling.timeout())?;
        let state = DashboardState::new(cfg.viewport, Duration::from_millis(cfg.form.reload_delay_ms));
        Ok(Self {
            client,
            state: new_state(state),
            notifier: Notifier::new(Duration::from_millis(cfg.notify.banner_ms)),
            polling: cfg.polling.clone(),
        })
    }

    pub fn client(&self) -> &BorderRouterClient {
        &self.client
    }

    pub fn state(&self) -> &Shared<DashboardState> {
        &self.state
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Fusionne un snapshot de noeuds puis recalcule graphe et tableau.
    pub fn apply_nodes(&self, batch: Vec<Node>) -> Result<TopologyReport, LinkError> {
        let mut st = self.state.lock();
        let applied = st.topology.apply_snapshot(batch);
        let report = match applied {
            Ok(report) => report,
            Err(e) => {
                drop(st);
                tracing::warn!("[session] nodes snapshot rejected: {e}");
                self.notifier.notify(INVALID_ROUTES);
                return Err(e);
            }
        };

        let st = &mut *st;
        let appeared = st.layout.sync(&st.topology);
        if !appeared && !report.links.is_empty() {
            st.layout.restart();
        }
        st.layout.settle(&st.topology);
        st.node_table.refresh(st.topology.devices());

        if !report.is_empty() {
            tracing::debug!(
                "[session] nodes +{} ~{} -{}, links +{} ~{} -{}",
                report.nodes.inserted.len(),
                report.nodes.updated.len(),
                report.nodes.removed.len(),
                report.links.inserted.len(),
                report.links.updated.len(),
                report.links.removed.len()
            );
        }
        Ok(report)
    }

    pub fn apply_leases(&self, leases: Vec<Lease>, now: OffsetDateTime) -> ReconcileReport<String> {
        let mut st = self.state.lock();
        let st = &mut *st;
        let report = st.leases.apply_snapshot(leases, now);
        st.lease_table.refresh(st.leases.leases().iter());
        report
    }

    pub fn prune_leases(&self, now: OffsetDateTime) -> Vec<String> {
        let mut st = self.state.lock();
        let st = &mut *st;
        let removed = st.leases.prune_expired(now);
        if !removed.is_empty() {
            st.lease_table.refresh(st.leases.leases().iter());
        }
        removed
    }

    /// Un cycle `/db/nodes`. `Ok(None)` : réponse sans clé `nodes`, ignorée.
    pub async fn refresh_nodes(&self) -> Result<Option<TopologyReport>, SessionError> {
        let batch = match self.client.fetch_nodes().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                tracing::debug!("[session] nodes response without `nodes`, ignored");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("[session] nodes poll failed: {e}");
                self.notifier.notify(NODES_UNREACHABLE);
                return Err(e.into());
            }
        };
        Ok(Some(self.apply_nodes(batch)?))
    }

    /// Un cycle `/db/leases`. `apply_leases` élague lui-même, un fetch raté
    /// élague quand même : une seule passe sur le tableau par cycle.
    pub async fn refresh_leases(&self) -> Result<ReconcileReport<String>, SessionError> {
        match self.client.fetch_leases().await {
            Ok(leases) => Ok(self.apply_leases(leases, OffsetDateTime::now_utc())),
            Err(e) => {
                tracing::warn!("[session] leases poll failed: {e}");
                self.prune_leases(OffsetDateTime::now_utc());
                self.notifier.notify(LEASES_UNREACHABLE);
                Err(e.into())
            }
        }
    }

    pub async fn load_config(&self) -> Result<(), SessionError> {
        let document = match self.client.fetch_config().await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("[session] config fetch failed: {e}");
                self.state.lock().form.load_failed(CONFIG_UNREACHABLE);
                self.notifier.notify(CONFIG_UNREACHABLE);
                return Err(e.into());
            }
        };
        tracing::info!("[session] configuration loaded ({} options)", document.len());
        self.state.lock().form.loaded(document)?;
        Ok(())
    }

    /// Soumet le formulaire. Retourne le délai avant rechargement de la page.
    pub async fn submit_config(&self, edits: Vec<(String, String)>) -> Result<Duration, SessionError> {
        let document = self.state.lock().form.begin_submit(edits)?;

        let sent = self.client.submit_config(&document).await;
        match sent {
            Ok(()) => {
                let delay = self.state.lock().form.submit_succeeded()?;
                Ok(delay)
            }
            Err(e) => {
                tracing::warn!("[session] config submit failed: {e}");
                self.state.lock().form.submit_failed(e.to_string())?;
                self.notifier.notify(CONFIG_NOT_SAVED);
                Err(e.into())
            }
        }
    }

    pub fn toggle_labels(&self) -> LabelMode {
        let (mode, message) = {
            let mut st = self.state.lock();
            let message = st.labels.toggle();
            (st.labels, message)
        };
        self.notifier.notify(message);
        mode
    }

    pub fn pin(&self, rloc16: &str, x: f64, y: f64) -> bool {
        let mut st = self.state.lock();
        let st = &mut *st;
        let found = st.layout.pin_at(rloc16, x, y);
        if found {
            st.layout.settle(&st.topology);
        }
        found
    }

    pub fn release(&self, rloc16: &str) -> bool {
        let mut st = self.state.lock();
        let st = &mut *st;
        let found = st.layout.release(rloc16);
        if found {
            st.layout.settle(&st.topology);
        }
        found
    }

    /// Démarre les deux boucles de polling (noeuds, baux).
    pub fn spawn_pollers(&self) -> Vec<JoinHandle<()>> {
        let nodes = self.clone();
        let leases = self.clone();
        vec![
            spawn_poller("nodes", self.polling.nodes_period(), move || {
                let session = nodes.clone();
                async move {
                    let _ = session.refresh_nodes().await;
                }
            }),
            spawn_poller("leases", self.polling.leases_period(), move || {
                let session = leases.clone();
                async move {
                    let _ = session.refresh_leases().await;
                }
            }),
        ]
    }
}
