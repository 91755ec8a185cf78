/**
 * TOPOLOGIE MESH - Noeuds Thread et liens de routage dérivés
 *
 * RÔLE :
 * Fusionne les snapshots de `/db/nodes` et en dérive les liens affichés
 * dans le graphe :
 * - routeur -> routeur (qualité d'après inCost : 1 good, 2 normal, 3 bad)
 * - parent -> enfant (qualité "child")
 * - border router -> "cloud" (qualité = internetAccess)
 *
 * RÈGLES :
 * - un coût hors table rejette tout le snapshot avant la moindre mutation
 * - une route vers un noeud inconnu est ignorée (convergence au poll suivant)
 * - les liens sont dérivés après la fusion de tous les noeuds du lot,
 *   l'ordre des enregistrements n'a donc pas d'importance
 * - id de lien = source ++ target, un coût qui change met à jour le lien existant
 */

use crate::collection::{KeyedCollection, Keyed, ReconcileReport, Upsert};
use crate::models::{InternetAccess, Liveness, Node, CLOUD_RLOC16};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("route cost {cost} outside the quality table (1..=3)")]
    CostOutOfRange { cost: u32 },
    #[error("route {from} -> {to}: cost {cost} outside the quality table (1..=3)")]
    InvalidRoute { from: String, to: String, cost: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    Bad,
    Normal,
    Good,
    Child,
    Online,
    Offline,
}

/// Index = inCost - 1.
const COST_QUALITIES: [LinkQuality; 3] = [LinkQuality::Good, LinkQuality::Normal, LinkQuality::Bad];

impl LinkQuality {
    pub fn from_cost(cost: u32) -> Result<Self, LinkError> {
        cost.checked_sub(1)
            .and_then(|idx| COST_QUALITIES.get(idx as usize))
            .copied()
            .ok_or(LinkError::CostOutOfRange { cost })
    }

    /// Lien de routage entre routeurs (dessiné en arc avec flèche).
    pub fn is_routing(&self) -> bool {
        matches!(self, LinkQuality::Good | LinkQuality::Normal | LinkQuality::Bad)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkQuality::Bad => "bad",
            LinkQuality::Normal => "normal",
            LinkQuality::Good => "good",
            LinkQuality::Child => "child",
            LinkQuality::Online => "online",
            LinkQuality::Offline => "offline",
        }
    }
}

impl From<InternetAccess> for LinkQuality {
    fn from(access: InternetAccess) -> Self {
        match access {
            InternetAccess::Online => LinkQuality::Online,
            InternetAccess::Offline => LinkQuality::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
    pub quality: LinkQuality,
}

impl Link {
    pub fn new(source: &str, target: &str, quality: LinkQuality) -> Self {
        Link {
            id: format!("{source}{target}"),
            source: source.to_string(),
            target: target.to_string(),
            quality,
        }
    }

    pub fn touches(&self, rloc16: &str) -> bool {
        self.source == rloc16 || self.target == rloc16
    }
}

impl Keyed for Link {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn merge_from(&mut self, incoming: Self) -> bool {
        let changed = self.quality != incoming.quality;
        self.quality = incoming.quality;
        changed
    }
}

impl Keyed for Node {
    type Key = String;

    fn key(&self) -> String {
        self.rloc16.clone()
    }

    fn is_live(&self) -> bool {
        self.active == Liveness::Active
    }

    fn merge_from(&mut self, incoming: Self) -> bool {
        let first_seen = incoming.first_seen.or(self.first_seen);
        let merged = Node { first_seen, ..incoming };
        let changed = *self != merged;
        *self = merged;
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyReport {
    pub nodes: ReconcileReport<String>,
    pub links: ReconcileReport<String>,
}

impl TopologyReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: KeyedCollection<Node>,
    links: KeyedCollection<Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &KeyedCollection<Node> {
        &self.nodes
    }

    pub fn links(&self) -> &KeyedCollection<Link> {
        &self.links
    }

    pub fn node(&self, rloc16: &str) -> Option<&Node> {
        self.nodes.find_by_key(&rloc16.to_string())
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.find_by_key(&id.to_string())
    }

    /// Noeuds réels du mesh, sans le cloud synthétique.
    pub fn devices(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_cloud())
    }

    /// Vérifie tous les coûts de routage d'un lot avant de l'appliquer,
    /// quel que soit le rôle annoncé par le noeud.
    pub fn validate(batch: &[Node]) -> Result<(), LinkError> {
        for node in batch.iter().filter(|n| n.is_live()) {
            for route in &node.routes {
                LinkQuality::from_cost(route.in_cost).map_err(|_| LinkError::InvalidRoute {
                    from: node.rloc16.clone(),
                    to: route.target.clone(),
                    cost: route.in_cost,
                })?;
            }
        }
        Ok(())
    }

    /// Applique un snapshot complet de `/db/nodes`.
    pub fn apply_snapshot(&mut self, batch: Vec<Node>) -> Result<TopologyReport, LinkError> {
        Self::validate(&batch)?;

        let mut touched: Vec<String> = Vec::new();
        for node in &batch {
            if node.is_live() && !touched.contains(&node.rloc16) {
                touched.push(node.rloc16.clone());
            }
        }

        let mut report = TopologyReport {
            nodes: self.nodes.reconcile(batch),
            ..TopologyReport::default()
        };

        for rloc16 in &report.nodes.removed {
            let removed = self.links.retain(|l| !l.touches(rloc16));
            report.links.removed.extend(removed);
        }

        for rloc16 in &touched {
            // un inactif plus loin dans le lot a pu retirer ce noeud
            let Some(node) = self.nodes.find_by_key(rloc16).cloned() else { continue };
            self.update_links(&node, &mut report);
        }

        self.sync_cloud(&mut report);
        Ok(report)
    }

    // Infaillible : tous les coûts du lot ont été validés avant la fusion.
    fn update_links(&mut self, node: &Node, report: &mut TopologyReport) {
        if node.is_router() {
            let mut routed = HashSet::new();
            for route in &node.routes {
                let Some(peer) = self.nodes.find_by_key(&route.target) else {
                    continue;
                };
                let Ok(quality) = LinkQuality::from_cost(route.in_cost) else { continue };
                let outgoing = Link::new(&node.rloc16, &peer.rloc16, quality);
                routed.insert(outgoing.id.clone());
                put_link(&mut self.links, outgoing, &mut report.links);

                let back = peer.route_to(&node.rloc16).filter(|_| peer.is_router());
                if let Some(Ok(quality)) = back.map(|r| LinkQuality::from_cost(r.in_cost)) {
                    put_link(&mut self.links, Link::new(&peer.rloc16, &node.rloc16, quality), &mut report.links);
                }
            }

            // un routeur n'est l'enfant de personne (promotion d'un end device)
            let removed = self.links.retain(|l| {
                if l.quality == LinkQuality::Child && l.target == node.rloc16 {
                    return false;
                }
                if l.source != node.rloc16 {
                    return true;
                }
                match l.quality {
                    q if q.is_routing() => routed.contains(&l.id),
                    LinkQuality::Child => node.has_child(&l.target),
                    _ => true,
                }
            });
            report.links.removed.extend(removed);
        } else {
            // plus routeur : ni route sortante ni enfant
            let removed = self
                .links
                .retain(|l| !(l.source == node.rloc16 && (l.quality.is_routing() || l.quality == LinkQuality::Child)));
            report.links.removed.extend(removed);
        }

        if node.is_end_device() {
            let parent = self
                .nodes
                .iter()
                .find(|p| p.is_router() && p.has_child(&node.rloc16))
                .map(|p| p.rloc16.clone());

            let removed = self.links.retain(|l| {
                !(l.quality == LinkQuality::Child && l.target == node.rloc16 && Some(&l.source) != parent.as_ref())
            });
            report.links.removed.extend(removed);

            if let Some(parent) = parent {
                put_link(&mut self.links, Link::new(&parent, &node.rloc16, LinkQuality::Child), &mut report.links);
            }
        }

        let internet_id = format!("{}{}", node.rloc16, CLOUD_RLOC16);
        if node.is_border_router() {
            if self.nodes.upsert(Node::cloud()) == Upsert::Inserted {
                report.nodes.inserted.push(CLOUD_RLOC16.to_string());
            }
            let quality = node.internet_access.map(LinkQuality::from).unwrap_or(LinkQuality::Offline);
            put_link(&mut self.links, Link::new(&node.rloc16, CLOUD_RLOC16, quality), &mut report.links);
        } else if self.links.remove(&internet_id).is_some() {
            report.links.removed.push(internet_id);
        }
    }

    /// Le cloud n'existe que tant qu'un border router y est relié.
    fn sync_cloud(&mut self, report: &mut TopologyReport) {
        let cloud = CLOUD_RLOC16.to_string();
        let linked = self.links.iter().any(|l| l.target == cloud);
        if !linked && self.nodes.remove(&cloud).is_some() {
            report.nodes.inserted.retain(|k| k != &cloud);
            report.nodes.removed.push(cloud);
        }
    }
}

fn put_link(links: &mut KeyedCollection<Link>, link: Link, report: &mut ReconcileReport<String>) {
    let id = link.id.clone();
    match links.upsert(link) {
        Upsert::Inserted => {
            report.removed.retain(|k| k != &id);
            if !report.inserted.contains(&id) {
                report.inserted.push(id);
            }
        }
        Upsert::Updated => {
            if !report.inserted.contains(&id) && !report.updated.contains(&id) {
                report.updated.push(id);
            }
        }
        Upsert::Unchanged => {}
    }
}
