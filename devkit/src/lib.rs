/*!
# KiBRA DevKit - Stubs et Utilitaires pour les tests du dashboard

Bibliothèque facilitant le test du dashboard sans border router réel :
- Stub HTTP du border router (`/db/nodes`, `/db/leases`, `/db/cfg`)
- Simulation de pannes (statut HTTP, JSON invalide)
- Builders de fixtures JSON au format KiBRA
- Harness de test avec attente des requêtes
*/

pub mod border_router_stub;
pub mod fixtures;
pub mod test_utils;

pub use border_router_stub::{StubBorderRouter, StubMode};
pub use fixtures::{KibraFixtures, NodeBuilder};
pub use test_utils::TestHarness;
