/**
 * MODÈLES - Documents JSON exposés par le border router KiBRA
 *
 * RÔLE : Types serde pour `/db/nodes`, `/db/leases` et `/db/cfg`.
 * Le border router n'est pas strict sur les types (inCost en "1" ou 1,
 * timestamps en epoch ms ou RFC 3339, children en objets ou en chaînes),
 * on normalise tout à la désérialisation.
 */

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Clé du noeud synthétique qui représente l'accès internet des border routers.
pub const CLOUD_RLOC16: &str = "cloud";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Leader,
    Router,
    BorderRouter,
    EndDevice,
    Internet,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Router => "router",
            Role::BorderRouter => "border-router",
            Role::EndDevice => "end-device",
            Role::Internet => "internet",
            Role::Unknown => "unknown",
        }
    }
}

/// Rôle principal, utilisé pour la forme et la classe CSS dans le graphe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MainRole {
    Leader,
    BorderRouter,
    Router,
    Internet,
    Child,
}

impl MainRole {
    pub fn css_class(&self) -> &'static str {
        match self {
            MainRole::Leader => "leader",
            MainRole::BorderRouter => "borderRouter",
            MainRole::Router => "router",
            MainRole::Internet => "internet",
            MainRole::Child => "child",
        }
    }
}

/// Drapeau `active` ("yes" / "no" côté border router).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    #[default]
    Active,
    Inactive,
}

impl Serialize for Liveness {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Liveness::Active => "yes",
            Liveness::Inactive => "no",
        })
    }
}

impl<'de> Deserialize<'de> for Liveness {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let inactive = match Scalar::deserialize(deserializer)? {
            Scalar::Bool(flag) => !flag,
            Scalar::Text(text) => matches!(text.trim(), "no" | "false"),
            Scalar::Int(n) => n == 0,
            other => return Err(de::Error::custom(format!("invalid active flag: {other}"))),
        };
        Ok(if inactive { Liveness::Inactive } else { Liveness::Active })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InternetAccess {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub target: String,
    #[serde(rename = "inCost", deserialize_with = "de_cost")]
    pub in_cost: u32,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Entrée de la table des enfants d'un routeur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawChild")]
pub struct ChildRef {
    pub rloc16: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChild {
    Bare(String),
    Entry {
        rloc16: String,
        #[serde(default, deserialize_with = "de_opt_text")]
        timeout: Option<String>,
    },
}

impl From<RawChild> for ChildRef {
    fn from(raw: RawChild) -> Self {
        match raw {
            RawChild::Bare(rloc16) => ChildRef { rloc16, timeout: None },
            RawChild::Entry { rloc16, timeout } => ChildRef { rloc16, timeout },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub rloc16: String,
    /// Router ID (absent pour les end devices)
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub active: Liveness,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_access: Option<InternetAccess>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<OffsetDateTime>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<OffsetDateTime>,
}

impl Node {
    /// Noeud synthétique "cloud" relié aux border routers.
    pub fn cloud() -> Self {
        Node {
            rloc16: CLOUD_RLOC16.to_string(),
            id: None,
            roles: vec![Role::Internet],
            active: Liveness::Active,
            addresses: Vec::new(),
            routes: Vec::new(),
            children: Vec::new(),
            internet_access: None,
            first_seen: None,
            last_seen: None,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_router(&self) -> bool {
        self.has_role(Role::Router)
    }

    pub fn is_end_device(&self) -> bool {
        self.has_role(Role::EndDevice)
    }

    pub fn is_border_router(&self) -> bool {
        self.has_role(Role::BorderRouter)
    }

    pub fn is_cloud(&self) -> bool {
        self.rloc16 == CLOUD_RLOC16
    }

    pub fn main_role(&self) -> MainRole {
        if self.has_role(Role::Leader) {
            MainRole::Leader
        } else if self.has_role(Role::BorderRouter) {
            MainRole::BorderRouter
        } else if self.has_role(Role::Router) {
            MainRole::Router
        } else if self.has_role(Role::Internet) {
            MainRole::Internet
        } else {
            MainRole::Child
        }
    }

    pub fn route_to(&self, target: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.target == target)
    }

    pub fn has_child(&self, rloc16: &str) -> bool {
        self.children.iter().any(|c| c.rloc16 == rloc16)
    }

    pub fn roles_label(&self) -> String {
        self.roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
    }
}

/// Réponse de `GET /db/nodes`. Un corps sans clé `nodes` est ignoré.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodesSnapshot {
    #[serde(default)]
    pub nodes: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub duid: String,
    pub gua: String,
    #[serde(with = "timestamp")]
    pub expires: OffsetDateTime,
}

impl Lease {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }
}

/// Réponse de `GET /db/leases`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeasesSnapshot {
    #[serde(default)]
    pub leases: Vec<Lease>,
}

/// Configuration du border router : map plate option -> valeur texte.
/// Remplacée en entier à chaque soumission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    options: BTreeMap<String, String>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigDocument {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ConfigDocument {
            options: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Serialize for ConfigDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.options.len()))?;
        for (k, v) in &self.options {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfigDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<Scalar>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, v.map(|s| s.to_string()).unwrap_or_default()))
            .collect())
    }
}

/// Valeur scalaire telle que le border router peut l'envoyer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Other(v) => write!(f, "{v}"),
        }
    }
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|s| s.to_string()))
}

// Coût négatif -> 0, hors table, rejeté plus tard par le dérivateur de liens.
fn de_cost<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(n) => Ok(u32::try_from(n).unwrap_or(0)),
        Scalar::Text(text) => text
            .trim()
            .parse::<u32>()
            .map_err(|_| de::Error::custom(format!("invalid inCost: {text:?}"))),
        other => Err(de::Error::custom(format!("invalid inCost: {other}"))),
    }
}

/// Timestamps : epoch millisecondes (nombre ou chaîne) ou RFC 3339.
/// Toujours resérialisés en RFC 3339.
pub mod timestamp {
    use super::*;

    pub fn parse(raw: &str) -> Option<OffsetDateTime> {
        let raw = raw.trim();
        if let Ok(ms) = raw.parse::<i64>() {
            return from_millis(ms);
        }
        OffsetDateTime::parse(raw, &Rfc3339).ok()
    }

    pub fn from_millis(ms: i64) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
    }

    fn from_scalar<E: de::Error>(value: Scalar) -> Result<OffsetDateTime, E> {
        let parsed = match &value {
            Scalar::Int(ms) => from_millis(*ms),
            Scalar::Float(ms) => from_millis(*ms as i64),
            Scalar::Text(text) => parse(text),
            _ => None,
        };
        parsed.ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
    }

    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        from_scalar(Scalar::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(ts: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
            match Option::<Scalar>::deserialize(deserializer)? {
                Some(value) => from_scalar(value).map(Some),
                None => Ok(None),
            }
        }
    }
}
