/**
 * GRAPHE DU MESH - Simulation de forces et rendu SVG
 *
 * RÔLE :
 * Place les noeuds de la topologie dans le viewport et produit le SVG servi
 * par `/network/graph.svg`.
 *
 * FONCTIONNEMENT (intégration de Verlet façon d3 v3) :
 * - alpha démarre à 0.1, x0.99 par tick, arrêt sous 0.005
 * - liens : ressort de force 1, longueur height/12 (enfant) ou height/4
 * - gravité 0.01 vers le centre, charge -height (-height/2 pour un enfant)
 * - friction 0.9 sur la vitesse implicite (x - px)
 * - noeud fixé : ramené sur sa position épinglée à chaque tick
 *
 * Le leader est épinglé au centre à sa première apparition. Les nouveaux
 * noeuds sont posés sur une spirale à angle d'or autour du centre, la mise
 * en page est donc déterministe.
 */

use crate::models::{MainRole, Node};
use crate::table::{escape, format_date};
use crate::topology::{LinkQuality, Topology};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const ALPHA_START: f64 = 0.1;
const ALPHA_DECAY: f64 = 0.99;
const ALPHA_MIN: f64 = 0.005;
const GRAVITY: f64 = 0.01;
const FRICTION: f64 = 0.9;
const LINK_STRENGTH: f64 = 1.0;
const GOLDEN_RATIO_CONJ: f64 = 0.618_034;
const SPIRAL_STEP: f64 = 10.0;

const NODE_RADIUS: f64 = 18.0;
const LABEL_OFFSET: f64 = -24.0;

const BR_SHAPE: &str = "M-26,0A26,26 0 1,0 26,0A26,26 0 1,0 -26,0Z";
const LEADER_SHAPE: &str = "M0,-13L3.8,-4.2L12.4,-4L5.6,2.2L7.6,10.6L0,6L-7.6,10.6L-5.6,2.2L-12.4,-4L-3.8,-4.2Z";
const ROUTER_SHAPE: &str = "M0,-12L10.4,-6L10.4,6L0,12L-10.4,6L-10.4,-6Z";
const CHILD_SHAPE: &str = "M-7,0A7,7 0 1,0 7,0A7,7 0 1,0 -7,0Z";
const CLOUD_SHAPE: &str = "M-50,20A20,20 0 0,1 -40,-16A28,28 0 0,1 8,-30A30,30 0 0,1 48,-6A20,20 0 0,1 44,20Z";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 960.0, height: 600.0 }
    }
}

impl Viewport {
    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Position affichable : x dans [20, w-20], y dans [32, h-20].
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (bound(x, 20.0, self.width - 20.0), bound(y, 32.0, self.height - 20.0))
    }

    /// Le nuage est plus large, marges 80 / 60.
    pub fn clamp_cloud(&self, x: f64, y: f64) -> (f64, f64) {
        (bound(x, 80.0, self.width - 80.0), bound(y, 60.0, self.height - 60.0))
    }

    fn clamp_for(&self, node: &Node, x: f64, y: f64) -> (f64, f64) {
        if node.is_cloud() {
            self.clamp_cloud(x, y)
        } else {
            self.clamp(x, y)
        }
    }
}

// max puis min : un viewport plus petit que les marges retombe sur la borne basse
fn bound(v: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(v))
}

/// Étiquette affichée au-dessus des noeuds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelMode {
    #[default]
    Rloc16,
    RouterId,
}

impl LabelMode {
    /// Bascule et retourne le message de notification associé.
    pub fn toggle(&mut self) -> &'static str {
        match self {
            LabelMode::Rloc16 => {
                *self = LabelMode::RouterId;
                "Showing Router IDs."
            }
            LabelMode::RouterId => {
                *self = LabelMode::Rloc16;
                "Showing RLOC16s."
            }
        }
    }

    pub fn label(&self, node: &Node) -> String {
        match self {
            LabelMode::Rloc16 => node.rloc16.clone(),
            LabelMode::RouterId => node.id.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Body {
    x: f64,
    y: f64,
    px: f64,
    py: f64,
    fixed: bool,
}

impl Body {
    fn at(x: f64, y: f64, fixed: bool) -> Self {
        Body { x, y, px: x, py: y, fixed }
    }
}

/// Position publique d'un noeud (déjà bornée au viewport).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub rloc16: String,
    pub x: f64,
    pub y: f64,
    pub fixed: bool,
}

#[derive(Debug, Clone)]
pub struct ForceLayout {
    viewport: Viewport,
    alpha: f64,
    bodies: IndexMap<String, Body>,
    placed: usize,
}

impl ForceLayout {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport, alpha: 0.0, bodies: IndexMap::new(), placed: 0 }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_running(&self) -> bool {
        self.alpha > 0.0
    }

    pub fn restart(&mut self) {
        self.alpha = ALPHA_START;
    }

    /// Aligne les corps sur les noeuds de la topologie. Retourne `true` si
    /// un noeud est apparu ou a disparu (la simulation est alors relancée).
    pub fn sync(&mut self, topology: &Topology) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|rloc16, _| topology.node(rloc16).is_some());
        let mut changed = self.bodies.len() != before;

        for node in topology.nodes().iter() {
            if self.bodies.contains_key(&node.rloc16) {
                continue;
            }
            let body = if node.main_role() == MainRole::Leader {
                let (cx, cy) = self.viewport.center();
                Body::at(cx, cy, true)
            } else {
                let (x, y) = self.spiral_slot();
                Body::at(x, y, false)
            };
            self.bodies.insert(node.rloc16.clone(), body);
            changed = true;
        }

        if changed {
            self.restart();
        }
        changed
    }

    fn spiral_slot(&mut self) -> (f64, f64) {
        let index = self.placed as f64;
        self.placed += 1;
        let (cx, cy) = self.viewport.center();
        let radius = SPIRAL_STEP * (index + 0.5).sqrt();
        let angle = (index * GOLDEN_RATIO_CONJ + 0.11) * std::f64::consts::TAU;
        (cx + radius * angle.cos(), cy + radius * angle.sin())
    }

    /// Début de drag : le noeud est fixé à la position donnée.
    pub fn pin_at(&mut self, rloc16: &str, x: f64, y: f64) -> bool {
        let Some(body) = self.bodies.get_mut(rloc16) else { return false };
        *body = Body::at(x, y, true);
        self.restart();
        true
    }

    /// Double-clic : le noeud redevient libre.
    pub fn release(&mut self, rloc16: &str) -> bool {
        let Some(body) = self.bodies.get_mut(rloc16) else { return false };
        body.fixed = false;
        self.restart();
        true
    }

    pub fn is_pinned(&self, rloc16: &str) -> bool {
        self.bodies.get(rloc16).is_some_and(|b| b.fixed)
    }

    pub fn position(&self, node: &Node) -> Option<(f64, f64)> {
        let body = self.bodies.get(&node.rloc16)?;
        Some(self.viewport.clamp_for(node, body.x, body.y))
    }

    pub fn placements(&self, topology: &Topology) -> Vec<Placement> {
        topology
            .nodes()
            .iter()
            .filter_map(|node| {
                let (x, y) = self.position(node)?;
                let fixed = self.is_pinned(&node.rloc16);
                Some(Placement { rloc16: node.rloc16.clone(), x, y, fixed })
            })
            .collect()
    }

    /// Un pas de simulation. Retourne `false` une fois refroidie.
    pub fn tick(&mut self, topology: &Topology) -> bool {
        if self.alpha <= 0.0 {
            return false;
        }
        let alpha = self.alpha;
        let height = self.viewport.height;

        // liens : correction de position pondérée par le degré
        let mut degree = vec![0.0_f64; self.bodies.len()];
        let mut springs = Vec::new();
        for link in topology.links().iter() {
            let (Some(s), Some(t)) = (self.bodies.get_index_of(&link.source), self.bodies.get_index_of(&link.target))
            else {
                continue;
            };
            degree[s] += 1.0;
            degree[t] += 1.0;
            let distance = if link.quality == LinkQuality::Child { height / 12.0 } else { height / 4.0 };
            springs.push((s, t, distance));
        }
        for (s, t, distance) in springs {
            let (sb, tb) = (self.bodies[s], self.bodies[t]);
            let (mut dx, mut dy) = (tb.x - sb.x, tb.y - sb.y);
            let len_sq = dx * dx + dy * dy;
            if len_sq <= 0.0 {
                continue;
            }
            let len = len_sq.sqrt();
            let l = alpha * LINK_STRENGTH * (len - distance) / len;
            dx *= l;
            dy *= l;
            let k = degree[s] / (degree[t] + degree[s]);
            let target = &mut self.bodies[t];
            target.x -= dx * k;
            target.y -= dy * k;
            let source = &mut self.bodies[s];
            source.x += dx * (1.0 - k);
            source.y += dy * (1.0 - k);
        }

        // gravité
        let (cx, cy) = self.viewport.center();
        let k = alpha * GRAVITY;
        for body in self.bodies.values_mut() {
            body.x += (cx - body.x) * k;
            body.y += (cy - body.y) * k;
        }

        // charge : répulsion par paires, appliquée à la position précédente
        let charges: Vec<f64> = self
            .bodies
            .keys()
            .map(|rloc16| match topology.node(rloc16).map(Node::main_role) {
                Some(MainRole::Child) => -height / 2.0,
                _ => -height,
            })
            .collect();
        let count = self.bodies.len();
        let mut kicks = vec![(0.0_f64, 0.0_f64); count];
        for i in 0..count {
            for j in 0..count {
                if i == j {
                    continue;
                }
                let (a, b) = (self.bodies[i], self.bodies[j]);
                let (mut dx, mut dy) = (b.x - a.x, b.y - a.y);
                if dx == 0.0 && dy == 0.0 {
                    // noeuds confondus : direction déterministe
                    let angle = ((i as f64) * GOLDEN_RATIO_CONJ + (j as f64) * 0.414_214) * std::f64::consts::TAU;
                    dx = angle.cos();
                    dy = angle.sin();
                }
                let dn = (dx * dx + dy * dy).max(1.0);
                let k = charges[j] * alpha / dn;
                kicks[i].0 -= dx * k;
                kicks[i].1 -= dy * k;
            }
        }
        for (body, (kx, ky)) in self.bodies.values_mut().zip(kicks) {
            if body.fixed {
                continue;
            }
            body.px += kx;
            body.py += ky;
        }

        // intégration
        for body in self.bodies.values_mut() {
            if body.fixed {
                body.x = body.px;
                body.y = body.py;
            } else {
                let (x, y) = (body.x, body.y);
                body.x -= (body.px - x) * FRICTION;
                body.y -= (body.py - y) * FRICTION;
                body.px = x;
                body.py = y;
            }
        }

        self.alpha *= ALPHA_DECAY;
        if self.alpha < ALPHA_MIN {
            self.alpha = 0.0;
            return false;
        }
        true
    }

    /// Fait tourner la simulation jusqu'au refroidissement, retourne le nombre de ticks.
    pub fn settle(&mut self, topology: &Topology) -> usize {
        let mut ticks = 0;
        while self.is_running() {
            self.tick(topology);
            ticks += 1;
        }
        ticks
    }

    pub fn render_svg(&self, topology: &Topology, labels: LabelMode) -> String {
        let Viewport { width, height } = self.viewport;
        let mut svg = String::new();
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" class=\"network\">\n\
             <rect width=\"{width}\" height=\"{height}\" class=\"holder\"/>\n<g class=\"links\">\n<defs>"
        );
        for quality in ["good", "normal", "bad"] {
            let _ = write!(
                svg,
                "<marker id=\"{quality}\" viewBox=\"0 -5 10 10\" refX=\"29\" refY=\"0\" markerWidth=\"7\" \
                 markerHeight=\"9\" orient=\"auto\"><path d=\"M0,-5L15,0L0,5\"/></marker>"
            );
        }
        svg.push_str("</defs>\n");

        for link in topology.links().iter() {
            let (Some(source), Some(target)) = (self.raw(&link.source), self.raw(&link.target)) else {
                continue;
            };
            let (sx, sy) = self.viewport.clamp(source.x, source.y);
            let (tx, ty) = self.viewport.clamp(target.x, target.y);
            let quality = link.quality.as_str();
            if link.quality.is_routing() {
                let dr = ((target.x - source.x).powi(2) + (target.y - source.y).powi(2)).sqrt() * 5.0;
                let _ = writeln!(
                    svg,
                    "<path class=\"link {quality}\" marker-end=\"url(#{quality})\" \
                     d=\"M{sx:.1},{sy:.1}A{dr:.1},{dr:.1} 0 0,1 {tx:.1},{ty:.1}\"/>"
                );
            } else {
                let _ = writeln!(svg, "<path class=\"link {quality}\" d=\"M{sx:.1},{sy:.1}L{tx:.1},{ty:.1}\"/>");
            }
        }
        svg.push_str("</g>\n<g class=\"nodes\">\n");

        for node in topology.devices().filter(|n| n.is_border_router()) {
            if let Some((x, y)) = self.position(node) {
                let _ = writeln!(svg, "<path class=\"br\" d=\"{BR_SHAPE}\" transform=\"translate({x:.1},{y:.1})\"/>");
            }
        }

        for node in topology.nodes().iter() {
            let Some((x, y)) = self.position(node) else { continue };
            let role = node.main_role();
            let key = escape(&node.rloc16);
            if role == MainRole::Internet {
                let _ = writeln!(
                    svg,
                    "<path class=\"cloud\" data-rloc16=\"{key}\" d=\"{CLOUD_SHAPE}\" transform=\"translate({x:.1},{y:.1})\"/>"
                );
                continue;
            }
            let mut base = String::from("nodebase");
            if role == MainRole::Child {
                base.push_str(" child");
            }
            if self.is_pinned(&node.rloc16) {
                base.push_str(" fixed");
            }
            let _ = writeln!(
                svg,
                "<circle class=\"{base}\" data-rloc16=\"{key}\" r=\"{NODE_RADIUS}\" transform=\"translate({x:.1},{y:.1})\"/>\n\
                 <path class=\"node {}\" d=\"{}\" transform=\"translate({x:.1},{y:.1})\"/>\n\
                 <g transform=\"translate({x:.1},{y:.1})\"><text class=\"label\" y=\"{LABEL_OFFSET}\">{}</text></g>",
                role.css_class(),
                role_shape(role),
                escape(&labels.label(node)),
            );
        }
        svg.push_str("</g>\n</svg>\n");
        svg
    }

    fn raw(&self, rloc16: &str) -> Option<&Body> {
        self.bodies.get(rloc16)
    }
}

fn role_shape(role: MainRole) -> &'static str {
    match role {
        MainRole::Leader => LEADER_SHAPE,
        MainRole::BorderRouter | MainRole::Router => ROUTER_SHAPE,
        MainRole::Child => CHILD_SHAPE,
        MainRole::Internet => CLOUD_SHAPE,
    }
}

/// Panneau d'information d'un noeud. Le nuage n'en a pas.
pub fn node_info(node: &Node) -> Option<String> {
    let last_seen = node.last_seen.map(format_date).unwrap_or_default();
    let roles = escape(&node.roles_label());
    match node.main_role() {
        MainRole::Internet => None,
        MainRole::Child => Some(format!(
            "<strong>Roles</strong><br/>{roles}<br/><strong>Last seen</strong><br/>{}",
            escape(&last_seen)
        )),
        _ => {
            let mut addresses = String::from("<span class=\"addresses\">");
            for addr in &node.addresses {
                let _ = write!(addresses, "{}<br/>", escape(addr));
            }
            addresses.push_str("</span>");
            Some(format!(
                "<strong>Roles</strong><br/>{roles}<br/><strong>Addresses</strong><br/>{addresses}\
                 <strong>Last seen</strong><br/>{}",
                escape(&last_seen)
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topology(value: serde_json::Value) -> Topology {
        let mut topo = Topology::new();
        topo.apply_snapshot(serde_json::from_value(value).unwrap()).unwrap();
        topo
    }

    fn mesh() -> Topology {
        topology(json!([
            {"rloc16": "0400", "id": "1", "roles": ["router", "leader", "border-router"], "internetAccess": "online",
             "routes": [{"target": "0800", "inCost": 1}], "children": ["0401"]},
            {"rloc16": "0800", "id": "2", "roles": ["router"], "routes": [{"target": "0400", "inCost": 2}]},
            {"rloc16": "0c00", "id": "3", "roles": ["router"], "routes": [{"target": "0800", "inCost": 3}]},
            {"rloc16": "0401", "roles": ["end-device"]}
        ]))
    }

    #[test]
    fn leader_stays_at_center() {
        let topo = mesh();
        let mut layout = ForceLayout::new(Viewport { width: 800.0, height: 600.0 });
        assert!(layout.sync(&topo));
        assert!(layout.is_running());
        layout.settle(&topo);

        let leader = topo.node("0400").unwrap();
        assert_eq!(layout.position(leader), Some((400.0, 300.0)));
        assert!(layout.is_pinned("0400"));
    }

    #[test]
    fn simulation_cools_down() {
        let topo = mesh();
        let mut layout = ForceLayout::new(Viewport::default());
        layout.sync(&topo);
        let ticks = layout.settle(&topo);
        // 0.1 * 0.99^n < 0.005
        assert!((290..=310).contains(&ticks), "ticks = {ticks}");
        assert!(!layout.tick(&topo));
        assert_eq!(layout.alpha(), 0.0);
    }

    #[test]
    fn positions_stay_inside_viewport() {
        let topo = mesh();
        let viewport = Viewport { width: 300.0, height: 200.0 };
        let mut layout = ForceLayout::new(viewport);
        layout.sync(&topo);
        layout.settle(&topo);
        for placement in layout.placements(&topo) {
            if placement.rloc16 == "cloud" {
                assert!((80.0..=220.0).contains(&placement.x));
                assert!((60.0..=140.0).contains(&placement.y));
            } else {
                assert!((20.0..=280.0).contains(&placement.x));
                assert!((32.0..=180.0).contains(&placement.y));
            }
        }
    }

    #[test]
    fn repulsion_separates_unlinked_nodes() {
        let topo = topology(json!([
            {"rloc16": "0800", "roles": ["router"]},
            {"rloc16": "0c00", "roles": ["router"]}
        ]));
        let mut layout = ForceLayout::new(Viewport::default());
        layout.sync(&topo);
        let gap = |layout: &ForceLayout| {
            let a = layout.position(topo.node("0800").unwrap()).unwrap();
            let b = layout.position(topo.node("0c00").unwrap()).unwrap();
            ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
        };
        let before = gap(&layout);
        for _ in 0..20 {
            layout.tick(&topo);
        }
        assert!(gap(&layout) > before);
    }

    #[test]
    fn drag_pins_and_double_click_releases() {
        let topo = mesh();
        let mut layout = ForceLayout::new(Viewport::default());
        layout.sync(&topo);
        layout.settle(&topo);

        assert!(layout.pin_at("0800", 100.0, 120.0));
        assert!(layout.is_running());
        layout.settle(&topo);
        assert_eq!(layout.position(topo.node("0800").unwrap()), Some((100.0, 120.0)));

        assert!(layout.release("0800"));
        assert!(!layout.is_pinned("0800"));
        assert!(!layout.pin_at("ffff", 0.0, 0.0));
    }

    #[test]
    fn sync_drops_vanished_nodes() {
        let mut topo = mesh();
        let mut layout = ForceLayout::new(Viewport::default());
        layout.sync(&topo);
        layout.settle(&topo);
        assert!(!layout.sync(&topo));

        topo.apply_snapshot(serde_json::from_value(json!([{"rloc16": "0c00", "active": "no"}])).unwrap())
            .unwrap();
        assert!(layout.sync(&topo));
        assert!(layout.placements(&topo).iter().all(|p| p.rloc16 != "0c00"));
    }

    #[test]
    fn label_toggle_round_trip() {
        let mut mode = LabelMode::default();
        let node: Node = serde_json::from_value(json!({"rloc16": "0400", "id": "1"})).unwrap();
        assert_eq!(mode.label(&node), "0400");
        assert_eq!(mode.toggle(), "Showing Router IDs.");
        assert_eq!(mode.label(&node), "1");
        assert_eq!(mode.toggle(), "Showing RLOC16s.");
        assert_eq!(mode, LabelMode::Rloc16);
    }

    #[test]
    fn info_panel_by_role() {
        let topo = mesh();
        let router = node_info(topo.node("0800").unwrap()).unwrap();
        assert!(router.contains("<strong>Addresses</strong>"));
        let child = node_info(topo.node("0401").unwrap()).unwrap();
        assert!(child.starts_with("<strong>Roles</strong><br/>end-device<br/>"));
        assert!(!child.contains("Addresses"));
        assert!(node_info(topo.node("cloud").unwrap()).is_none());
    }

    #[test]
    fn svg_has_markers_shapes_and_labels() {
        let topo = mesh();
        let mut layout = ForceLayout::new(Viewport::default());
        layout.sync(&topo);
        layout.settle(&topo);
        let svg = layout.render_svg(&topo, LabelMode::RouterId);

        for quality in ["good", "normal", "bad"] {
            assert!(svg.contains(&format!("<marker id=\"{quality}\"")));
        }
        assert!(svg.contains("class=\"link good\" marker-end=\"url(#good)\""));
        assert!(svg.contains("class=\"link child\" d=\"M"));
        assert!(svg.contains("class=\"link online\" d=\"M"));
        assert!(svg.contains("<path class=\"br\""));
        assert!(svg.contains("class=\"node leader\""));
        assert!(svg.contains("class=\"nodebase fixed\""));
        assert!(svg.contains("class=\"nodebase child\""));
        assert!(svg.contains("<path class=\"cloud\""));
        assert!(svg.contains("<text class=\"label\" y=\"-24\">2</text>"));
    }
}
