/*!
Builders de fixtures JSON au format du border router KiBRA

Les documents produits ont la forme exacte des réponses `/db/nodes`,
`/db/leases` et `/db/cfg` (timestamps en epoch millisecondes, `active`
en "yes"/"no", `inCost` numérique).
*/

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder fluide pour un noeud de `/db/nodes`
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Map<String, Value>,
    roles: Vec<&'static str>,
    routes: Vec<Value>,
    children: Vec<Value>,
}

impl NodeBuilder {
    fn new(rloc16: &str, role: &'static str) -> Self {
        let mut node = Map::new();
        node.insert("rloc16".into(), json!(rloc16));
        node.insert("active".into(), json!("yes"));
        node.insert("addresses".into(), json!([]));
        let seen = KibraFixtures::now_ms();
        node.insert("firstSeen".into(), json!(seen));
        node.insert("lastSeen".into(), json!(seen));
        Self { node, roles: vec![role], routes: Vec::new(), children: Vec::new() }
    }

    pub fn router(rloc16: &str) -> Self {
        Self::new(rloc16, "router")
    }

    pub fn end_device(rloc16: &str) -> Self {
        Self::new(rloc16, "end-device")
    }

    pub fn id(mut self, router_id: u8) -> Self {
        self.node.insert("id".into(), json!(router_id.to_string()));
        self
    }

    pub fn leader(mut self) -> Self {
        self.roles.push("leader");
        self
    }

    /// Border router avec accès internet "online" ou "offline"
    pub fn border_router(mut self, internet_access: &str) -> Self {
        self.roles.push("border-router");
        self.node.insert("internetAccess".into(), json!(internet_access));
        self
    }

    pub fn route(mut self, target: &str, in_cost: u32) -> Self {
        self.routes.push(json!({ "target": target, "inCost": in_cost }));
        self
    }

    pub fn child(mut self, rloc16: &str) -> Self {
        self.children.push(json!({ "rloc16": rloc16, "timeout": "240" }));
        self
    }

    pub fn address(mut self, addr: &str) -> Self {
        if let Some(Value::Array(list)) = self.node.get_mut("addresses") {
            list.push(json!(addr));
        }
        self
    }

    pub fn inactive(mut self) -> Self {
        self.node.insert("active".into(), json!("no"));
        self
    }

    pub fn build(self) -> Value {
        let mut node = self.node;
        node.insert("roles".into(), json!(self.roles));
        node.insert("routes".into(), Value::Array(self.routes));
        node.insert("children".into(), Value::Array(self.children));
        Value::Object(node)
    }
}

/// Documents complets prêts à servir par le stub
pub struct KibraFixtures;

impl KibraFixtures {
    pub fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn nodes_doc(nodes: Vec<Value>) -> Value {
        json!({ "nodes": nodes })
    }

    pub fn lease(duid: &str, gua: &str, expires: DateTime<Utc>) -> Value {
        json!({ "duid": duid, "gua": gua, "expires": expires.timestamp_millis() })
    }

    /// Bail qui expire dans `secs` secondes (négatif = déjà expiré)
    pub fn lease_expiring_in(duid: &str, gua: &str, secs: i64) -> Value {
        Self::lease(duid, gua, Utc::now() + Duration::seconds(secs))
    }

    pub fn leases_doc(leases: Vec<Value>) -> Value {
        json!({ "leases": leases })
    }

    /// Configuration telle que publiée par `/db/cfg`
    pub fn config_doc() -> Value {
        json!({
            "action_dhcp": "none",
            "action_mdns": "none",
            "action_nat": "none",
            "action_network": "none",
            "action_diags": "none",
            "action_serial": "none",
            "status_dhcp": "running",
            "status_mdns": "running",
            "status_nat": "running",
            "status_network": "running",
            "status_diags": "stopped",
            "status_serial": "running",
            "dongle_channel": 15,
            "dongle_name": "Test",
            "prefix": "fd00:db8::/64"
        })
    }

    /// Leader/border router 0400 + routeur 0800 + enfant 0401
    pub fn small_mesh() -> Value {
        Self::nodes_doc(vec![
            NodeBuilder::router("0400")
                .id(1)
                .leader()
                .border_router("online")
                .address("fd00::ff:fe00:400")
                .route("0800", 1)
                .child("0401")
                .build(),
            NodeBuilder::router("0800").id(2).route("0400", 2).build(),
            NodeBuilder::end_device("0401").build(),
        ])
    }
}
