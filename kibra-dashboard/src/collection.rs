/**
 * COLLECTIONS INDEXÉES - Réconciliation des snapshots du border router
 *
 * RÔLE : Garder en mémoire une collection ordonnée d'entités indexées par
 * une clé stable (rloc16, gua, id de lien) et y fusionner chaque snapshot.
 *
 * FONCTIONNEMENT :
 * - IndexMap clé -> entité, l'ordre d'insertion donne l'ordre des lignes
 * - absent -> ajout en fin, présent -> mise à jour en place
 * - entité non vivante (active == "no") -> jamais insérée, purgée si présente
 * - doublons dans un même lot : le dernier gagne
 *
 * Chaque réponse est appliquée comme un snapshot complet : ré-appliquer le
 * même snapshot ne produit aucun changement.
 */

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;

/// Entité identifiée par une clé stable.
pub trait Keyed {
    type Key: Eq + Hash + Clone + Display;

    fn key(&self) -> Self::Key;

    /// `false` quand le snapshot signale que l'entité doit disparaître.
    fn is_live(&self) -> bool {
        true
    }

    /// Écrase les champs mutables avec ceux du nouvel enregistrement.
    /// Retourne `true` si quelque chose a réellement changé.
    fn merge_from(&mut self, incoming: Self) -> bool;
}

/// Résultat d'une fusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport<K> {
    pub inserted: Vec<K>,
    pub updated: Vec<K>,
    pub removed: Vec<K>,
}

impl<K> Default for ReconcileReport<K> {
    fn default() -> Self {
        Self { inserted: Vec::new(), updated: Vec::new(), removed: Vec::new() }
    }
}

impl<K> ReconcileReport<K> {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct KeyedCollection<T: Keyed> {
    entries: IndexMap<T::Key, T>,
}

impl<T: Keyed> Default for KeyedCollection<T> {
    fn default() -> Self {
        Self { entries: IndexMap::new() }
    }
}

impl<T: Keyed> KeyedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_key(&self, key: &T::Key) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn find_by_key_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &T::Key> {
        self.entries.keys()
    }

    /// Ajout en fin si absent, fusion en place sinon.
    pub fn upsert(&mut self, item: T) -> Upsert {
        let key = item.key();
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if existing.merge_from(item) {
                    Upsert::Updated
                } else {
                    Upsert::Unchanged
                }
            }
            None => {
                self.entries.insert(key, item);
                Upsert::Inserted
            }
        }
    }

    /// Retire l'entité en conservant l'ordre des autres.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        self.entries.shift_remove(key)
    }

    /// Garde les entités pour lesquelles `keep` retourne vrai, retourne les clés retirées.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<T::Key>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        self.entries.retain(|key, item| {
            if keep(item) {
                true
            } else {
                removed.push(key.clone());
                false
            }
        });
        removed
    }

    /// Fusionne un lot complet d'enregistrements.
    pub fn reconcile<I>(&mut self, batch: I) -> ReconcileReport<T::Key>
    where
        I: IntoIterator<Item = T>,
    {
        let mut report = ReconcileReport::default();
        for item in batch {
            let key = item.key();
            if !item.is_live() {
                if self.remove(&key).is_some() {
                    report.inserted.retain(|k| k != &key);
                    report.updated.retain(|k| k != &key);
                    report.removed.push(key);
                }
                continue;
            }
            match self.upsert(item) {
                Upsert::Inserted => {
                    report.removed.retain(|k| k != &key);
                    report.inserted.push(key);
                }
                Upsert::Updated => {
                    if !report.inserted.contains(&key) && !report.updated.contains(&key) {
                        report.updated.push(key);
                    }
                }
                Upsert::Unchanged => {}
            }
        }
        report
    }
}
