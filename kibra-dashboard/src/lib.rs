/*!
# KiBRA Dashboard

Tableau de bord web d'un border router Thread KiBRA :
- polling de `/db/nodes`, `/db/leases`, `/db/cfg`
- réconciliation en collections indexées, dérivation des liens du mesh
- graphe de forces en SVG, tableaux HTML, formulaire de configuration
*/

pub mod collection;
pub mod config;
pub mod force;
pub mod form;
pub mod http;
pub mod leases;
pub mod models;
pub mod notify;
pub mod poller;
pub mod session;
pub mod state;
pub mod table;
pub mod topology;

pub use config::{load_config, DashboardConfig};
pub use session::Session;
