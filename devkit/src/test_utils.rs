/*!
Test Harness pour le dashboard KiBRA

Facilite l'écriture de tests d'intégration avec:
- Démarrage automatique du stub border router
- Config YAML du dashboard pointant sur le stub (polling rapide)
- Attente des requêtes de polling et assertions sur les soumissions
*/

use crate::border_router_stub::StubBorderRouter;
use crate::fixtures::KibraFixtures;
use anyhow::Result;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Harness de test complet autour d'un stub border router
pub struct TestHarness {
    pub stub: StubBorderRouter,
}

impl TestHarness {
    /// Démarre un stub servant la configuration par défaut
    pub async fn new() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let stub = StubBorderRouter::start().await?;
        stub.set_config(KibraFixtures::config_doc());
        Ok(Self { stub })
    }

    /// Config YAML du dashboard : polling rapide, bannière longue pour les assertions
    pub fn dashboard_yaml(&self) -> String {
        format!(
            "border_router:\n  host: {host}\n  port: {port}\n  control_port: {port}\n\
             polling:\n  nodes_ms: 50\n  leases_ms: 80\n  timeout_ms: 1000\n\
             viewport:\n  width: 800\n  height: 600\n\
             form:\n  reload_delay_ms: 3500\n\
             notify:\n  banner_ms: 60000\n\
             listen: 127.0.0.1:0\n",
            host = self.stub.host(),
            port = self.stub.port()
        )
    }

    /// Attend que `count` requêtes aient été reçues sur `path`
    pub async fn wait_for_requests(&self, path: &str, count: usize, timeout_ms: u64) -> Result<()> {
        let stub = self.stub.clone();
        let path_owned = path.to_string();
        if Self::wait_until(timeout_ms, move || stub.request_count(&path_owned) >= count).await {
            log::info!("✅ {} requests on {}", count, path);
            return Ok(());
        }
        anyhow::bail!(
            "Timeout waiting for {} requests on {} (got {})",
            count,
            path,
            self.stub.request_count(path)
        );
    }

    /// Attend qu'une condition devienne vraie, retourne false au timeout
    pub async fn wait_until<F>(timeout_ms: u64, condition: F) -> bool
    where
        F: Fn() -> bool,
    {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        log::warn!("⏰ Timeout after {} ms", timeout_ms);
        condition()
    }

    /// Assert qu'une option a été soumise avec une valeur donnée
    pub fn assert_submitted(&self, option: &str, expected: &Value) -> Result<()> {
        let Some(submitted) = self.stub.last_submission() else {
            anyhow::bail!("No configuration submitted");
        };
        match submitted.get(option) {
            Some(actual) if actual == expected => {
                log::info!("✅ Submitted {} = {:?}", option, expected);
                Ok(())
            }
            Some(actual) => anyhow::bail!("Option '{}' mismatch: expected {:?}, got {:?}", option, expected, actual),
            None => anyhow::bail!("Option '{}' missing from submission", option),
        }
    }
}
