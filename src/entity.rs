//! Clusters raw party tokens into canonical counterparties.
//!
//! Entities live in an arena addressed by stable integer ids. A merge is an
//! O(1) reassignment: the losing record keeps a forwarding id and is never
//! deleted, so token and transaction references stay valid. Exact keys (UPI
//! handles, identical normalized names) cluster unconditionally; everything
//! else goes through approximate name similarity against the entities seen so
//! far, which makes merging transitive within a pass.

use crate::narration::{RawPartyToken, TokenKind};
use crate::similarity::{comparison_key, name_similarity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Merchant,
    Bank,
    Unknown,
}

impl EntityKind {
    /// Specificity order used when merging two classifications.
    fn rank(self) -> u8 {
        match self {
            EntityKind::Merchant => 3,
            EntityKind::Person => 2,
            EntityKind::Bank => 1,
            EntityKind::Unknown => 0,
        }
    }

    fn from_token(kind: TokenKind) -> EntityKind {
        match kind {
            TokenKind::UpiHandle | TokenKind::Phone => EntityKind::Person,
            TokenKind::Merchant => EntityKind::Merchant,
            TokenKind::BankRef => EntityKind::Bank,
            TokenKind::Unresolved => EntityKind::Unknown,
        }
    }
}

/// A resolved counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: EntityId,
    pub display_name: String,
    /// Raw token texts that resolved to this entity.
    pub tokens: BTreeSet<String>,
    pub upi_handles: BTreeSet<String>,
    pub kind: EntityKind,
    /// Set when this record lost a merge; resolution follows the pointer.
    merged_into: Option<EntityId>,
}

impl CanonicalEntity {
    pub fn is_live(&self) -> bool {
        self.merged_into.is_none()
    }
}

pub struct EntityArena {
    entities: Vec<CanonicalEntity>,
    /// Exact keys: `upi:<handle>` and `name:<comparison key>`.
    exact_index: HashMap<String, EntityId>,
    /// Transaction id -> resolved entity for that transaction's counterparty.
    assignments: HashMap<u64, EntityId>,
    merge_threshold: f64,
}

impl EntityArena {
    pub fn new(merge_threshold: f64) -> Self {
        Self {
            entities: Vec::new(),
            exact_index: HashMap::new(),
            assignments: HashMap::new(),
            merge_threshold,
        }
    }

    /// Follows forwarding pointers to the surviving entity.
    pub fn resolve(&self, id: EntityId) -> EntityId {
        let mut current = id;
        while let Some(next) = self.entities[current.0].merged_into {
            current = next;
        }
        current
    }

    pub fn get(&self, id: EntityId) -> &CanonicalEntity {
        &self.entities[self.resolve(id).0]
    }

    pub fn entity_of(&self, txn_id: u64) -> Option<EntityId> {
        self.assignments.get(&txn_id).map(|&id| self.resolve(id))
    }

    /// Entities that have not been merged away, in id order.
    pub fn live_entities(&self) -> impl Iterator<Item = &CanonicalEntity> {
        self.entities.iter().filter(|e| e.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_live()).count()
    }

    /// Ingests one token, in arrival order, and records which entity the
    /// transaction's counterparty resolved to.
    ///
    /// Resolution order: UPI-handle exact key, normalized-name exact key,
    /// then best approximate match at or above the merge threshold; a new
    /// entity otherwise.
    pub fn observe(&mut self, txn_id: u64, token: &RawPartyToken) -> EntityId {
        let by_handle = token
            .upi_handle
            .as_ref()
            .and_then(|h| self.exact_index.get(&format!("upi:{h}")).copied())
            .map(|id| self.resolve(id));

        let by_name = name_index_key(&token.text)
            .and_then(|key| self.exact_index.get(&key).copied())
            .map(|id| self.resolve(id));

        let id = match (by_handle, by_name) {
            (Some(a), Some(b)) if a != b => self.merge(a, b),
            (Some(a), _) => a,
            (None, Some(b)) => b,
            (None, None) => match self.best_approximate_match(&token.text) {
                Some(id) => id,
                None => self.create_entity(token),
            },
        };

        let id = self.resolve(id);
        self.absorb_token(id, token);
        self.assignments.insert(txn_id, id);
        id
    }

    /// Merges the entity `from` into `keep`. Idempotent: merging twice, or
    /// merging an entity into itself, is a no-op. Returns the survivor.
    pub fn merge(&mut self, keep: EntityId, from: EntityId) -> EntityId {
        let keep = self.resolve(keep);
        let from = self.resolve(from);
        if keep == from {
            return keep;
        }

        // Lower id survives so repeated runs partition identically.
        let (keep, from) = if keep.0 < from.0 {
            (keep, from)
        } else {
            (from, keep)
        };

        log::debug!(
            "merging entity {:?} ({}) into {:?} ({})",
            from,
            self.entities[from.0].display_name,
            keep,
            self.entities[keep.0].display_name
        );

        let absorbed = std::mem::take(&mut self.entities[from.0].tokens);
        let handles = std::mem::take(&mut self.entities[from.0].upi_handles);
        let from_kind = self.entities[from.0].kind;
        self.entities[from.0].merged_into = Some(keep);

        let survivor = &mut self.entities[keep.0];
        for t in &absorbed {
            survivor.tokens.insert(t.clone());
        }
        for h in &handles {
            survivor.upi_handles.insert(h.clone());
        }
        if from_kind.rank() > survivor.kind.rank() {
            survivor.kind = from_kind;
        }

        // Redirect the exact keys the loser owned.
        for t in absorbed {
            if let Some(key) = name_index_key(&t) {
                self.exact_index.insert(key, keep);
            }
        }
        for h in handles {
            self.exact_index.insert(format!("upi:{h}"), keep);
        }

        keep
    }

    /// Best live entity whose display name or any member token clears the
    /// merge threshold. Comparing against member tokens (not only the
    /// representative name) is what makes merging transitive: a token similar
    /// to anything already absorbed lands in the same entity.
    fn best_approximate_match(&self, text: &str) -> Option<EntityId> {
        let mut best: Option<(EntityId, f64)> = None;

        for entity in self.live_entities() {
            let mut score = name_similarity(text, &entity.display_name);
            for member in &entity.tokens {
                if score >= 1.0 {
                    break;
                }
                score = score.max(name_similarity(text, member));
            }

            if score >= self.merge_threshold {
                let better = match best {
                    None => true,
                    // Strictly-greater keeps the lowest id on ties.
                    Some((_, best_score)) => score > best_score,
                };
                if better {
                    best = Some((entity.id, score));
                }
            }
        }

        best.map(|(id, _)| id)
    }

    fn create_entity(&mut self, token: &RawPartyToken) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(CanonicalEntity {
            id,
            display_name: token.text.clone(),
            tokens: BTreeSet::new(),
            upi_handles: BTreeSet::new(),
            kind: EntityKind::from_token(token.kind),
            merged_into: None,
        });
        id
    }

    fn absorb_token(&mut self, id: EntityId, token: &RawPartyToken) {
        let token_kind = EntityKind::from_token(token.kind);
        let entity = &mut self.entities[id.0];

        entity.tokens.insert(token.text.clone());
        if let Some(handle) = &token.upi_handle {
            entity.upi_handles.insert(handle.clone());
        }
        if token_kind.rank() > entity.kind.rank() {
            entity.kind = token_kind;
        }

        if let Some(handle) = &token.upi_handle {
            self.exact_index.insert(format!("upi:{handle}"), id);
        }
        if let Some(key) = name_index_key(&token.text) {
            self.exact_index.entry(key).or_insert(id);
        }
    }

    /// The current partition as sorted token lists per live entity. Used by
    /// the idempotence and monotonicity tests.
    pub fn partition(&self) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = self
            .live_entities()
            .map(|e| e.tokens.iter().cloned().collect())
            .collect();
        groups.sort();
        groups
    }
}

/// Exact-index key for a token text. Alphabetic names key on their comparison
/// form; digit-only names (phone numbers, bare reference identities) key on
/// the digits themselves so identical numbers cluster unconditionally.
fn name_index_key(text: &str) -> Option<String> {
    let key = comparison_key(text);
    if !key.is_empty() {
        return Some(format!("name:{key}"));
    }

    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("num:{digits}"))
    }
}
