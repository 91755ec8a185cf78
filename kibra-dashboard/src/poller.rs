/**
 * CLIENT DU BORDER ROUTER - Requêtes HTTP et boucles de polling
 *
 * RÔLE :
 * - GET `/db/nodes`, `/db/leases`, `/db/cfg` sur le port web du border router
 * - POST `/db/cfg` (document complet) sur le port de contrôle (11759)
 * - tâches périodiques : un tick = un poll lancé, sans attendre le précédent
 *
 * Les erreurs sont typées (transport, statut HTTP, JSON invalide) et
 * remontées à l'appelant, jamais paniquées : une boucle ne meurt pas.
 */

use crate::config::BorderRouterConf;
use crate::models::{ConfigDocument, Lease, LeasesSnapshot, Node, NodesSnapshot};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error on {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("malformed JSON from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BorderRouterClient {
    http: reqwest::Client,
    base_url: String,
    control_url: String,
}

impl BorderRouterClient {
    pub fn new(conf: &BorderRouterConf, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = format!("http://{}:{}", conf.host, conf.port);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport { url: base_url.clone(), source })?;
        Ok(Self {
            http,
            base_url,
            control_url: format!("http://{}:{}", conf.host, conf.control_port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport { url: url.clone(), source })?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Malformed { url, source })
    }

    /// `None` quand la réponse n'a pas de clé `nodes`.
    pub async fn fetch_nodes(&self) -> Result<Option<Vec<Node>>, FetchError> {
        let snapshot: NodesSnapshot = self.get_json("/db/nodes").await?;
        Ok(snapshot.nodes)
    }

    pub async fn fetch_leases(&self) -> Result<Vec<Lease>, FetchError> {
        let snapshot: LeasesSnapshot = self.get_json("/db/leases").await?;
        Ok(snapshot.leases)
    }

    pub async fn fetch_config(&self) -> Result<ConfigDocument, FetchError> {
        self.get_json("/db/cfg").await
    }

    /// Remplace la configuration du border router. Seul le statut compte.
    pub async fn submit_config(&self, document: &ConfigDocument) -> Result<(), FetchError> {
        let url = format!("{}/db/cfg", self.control_url);
        let response = self
            .http
            .post(&url)
            .json(document)
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }
        tracing::info!("[poller] configuration submitted ({} options)", document.len());
        Ok(())
    }
}

/// Lance `poll` à chaque période. Chaque poll est une tâche indépendante :
/// un poll lent n'empêche pas le suivant de partir.
pub fn spawn_poller<F, Fut>(name: &'static str, period: Duration, poll: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!("[poller] {name} every {} ms", period.as_millis());
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::trace!("[poller] {name} tick");
            tokio::spawn(poll());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_do_not_wait_for_slow_polls() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let handle = spawn_poller("test", Duration::from_millis(20), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();
        assert!(started.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn unreachable_border_router_is_a_transport_error() {
        // port libéré juste avant : rien n'écoute dessus
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let conf = BorderRouterConf { host: "127.0.0.1".into(), port, control_port: port };
        let client = BorderRouterClient::new(&conf, Duration::from_millis(500)).unwrap();
        assert_eq!(client.base_url(), format!("http://127.0.0.1:{port}"));

        let err = client.fetch_nodes().await.unwrap_err();
        assert!(err.is_transport(), "{err}");
        let err = client.submit_config(&ConfigDocument::new()).await.unwrap_err();
        assert!(err.is_transport());
    }
}
