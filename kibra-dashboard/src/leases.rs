/**
 * BAUX DHCPv6 - Suivi des baux publiés par `/db/leases`
 *
 * Les baux sont indexés par adresse globale (gua). À chaque cycle de
 * rafraîchissement, les baux expirés sont retirés côté client avant la
 * fusion (best effort, l'expiration qui fait foi reste celle du serveur).
 */

use crate::collection::{KeyedCollection, Keyed, ReconcileReport};
use crate::models::Lease;
use time::OffsetDateTime;

impl Keyed for Lease {
    type Key = String;

    fn key(&self) -> String {
        self.gua.clone()
    }

    fn merge_from(&mut self, incoming: Self) -> bool {
        let changed = *self != incoming;
        *self = incoming;
        changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaseBook {
    leases: KeyedCollection<Lease>,
}

impl LeaseBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leases(&self) -> &KeyedCollection<Lease> {
        &self.leases
    }

    pub fn find(&self, gua: &str) -> Option<&Lease> {
        self.leases.find_by_key(&gua.to_string())
    }

    /// Retire les baux expirés à `now`.
    pub fn prune_expired(&mut self, now: OffsetDateTime) -> Vec<String> {
        let removed = self.leases.retain(|lease| !lease.is_expired(now));
        if !removed.is_empty() {
            tracing::debug!("[leases] pruned {} expired lease(s)", removed.len());
        }
        removed
    }

    /// Élague puis fusionne un snapshot. Un bail déjà expiré n'est pas réinséré.
    pub fn apply_snapshot(&mut self, leases: Vec<Lease>, now: OffsetDateTime) -> ReconcileReport<String> {
        let pruned = self.prune_expired(now);
        let mut report = self
            .leases
            .reconcile(leases.into_iter().filter(|lease| !lease.is_expired(now)));
        for gua in pruned {
            if !report.inserted.contains(&gua) {
                report.removed.push(gua);
            }
        }
        report
    }
}
