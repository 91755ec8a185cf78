use crate::force::Viewport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub border_router: BorderRouterConf,
    pub polling: PollingConf,
    pub viewport: Viewport,
    pub form: FormConf,
    pub notify: NotifyConf,
    pub listen: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BorderRouterConf {
    pub host: String,
    pub port: u16,
    pub control_port: u16, // POST /db/cfg, 11759 sur KiBRA
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConf {
    pub nodes_ms: u64,
    pub leases_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FormConf {
    pub reload_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NotifyConf {
    pub banner_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            border_router: BorderRouterConf::default(),
            polling: PollingConf::default(),
            viewport: Viewport::default(),
            form: FormConf::default(),
            notify: NotifyConf::default(),
            listen: "0.0.0.0:8080".into(),
            api_key: None,
        }
    }
}

impl Default for BorderRouterConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 80, control_port: 11759 }
    }
}

impl Default for PollingConf {
    fn default() -> Self {
        Self { nodes_ms: 5000, leases_ms: 8000, timeout_ms: 4000 }
    }
}

impl Default for FormConf {
    fn default() -> Self {
        Self { reload_delay_ms: 3500 }
    }
}

impl Default for NotifyConf {
    fn default() -> Self {
        Self { banner_ms: 800 }
    }
}

impl PollingConf {
    pub fn nodes_period(&self) -> Duration {
        Duration::from_millis(self.nodes_ms.max(1))
    }

    pub fn leases_period(&self) -> Duration {
        Duration::from_millis(self.leases_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DashboardConfig {
    /// Variables d'environnement prioritaires sur le fichier.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("KIBRA_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(host) = std::env::var("KIBRA_BORDER_ROUTER") {
            self.border_router.host = host;
        }
        if self.api_key.as_deref().is_some_and(str::is_empty) {
            self.api_key = None;
        }
    }
}

pub async fn load_config_from(path: impl AsRef<Path>) -> DashboardConfig {
    let path = path.as_ref();
    if path.exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return DashboardConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            tracing::warn!("[config] invalid {}: {e}, using defaults", path.display());
            DashboardConfig::default()
        })
    } else {
        tracing::warn!("[config] no {}, using default config", path.display());
        DashboardConfig::default()
    }
}

pub async fn load_config() -> DashboardConfig {
    let path = std::env::var("KIBRA_DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.yaml".into());
    let mut cfg = load_config_from(&path).await;
    cfg.apply_env();
    cfg
}
