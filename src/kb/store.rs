//! Per-scope knowledge base.
//!
//! A KB holds ids only; assertions live in the TMS. The KB wraps a path
//! index over its ground and Skolemized members, a universal-fact index
//! keyed by referenced predicate, and a min-priority eviction queue that
//! makes room for new commits. Index maintenance on retraction is
//! event-driven (see the status plugin), so every query re-checks the
//! TMS for activity and membership.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, error, trace, warn};

use crate::base::{Config, IdGen, Name, now_millis};
use crate::event::{Event, EventBus};
use crate::index::PathIndex;
use crate::term::{Term, match_terms, Bindings};

use super::assertion::{
    Assertion, AssertionId, AssertionKind, KbId, PotentialAssertion, referenced_predicates,
};
use super::tms::Tms;

/// Eviction queue entry; lowest priority pops first, oldest breaks ties.
#[derive(Debug, Clone, PartialEq)]
struct EvictEntry {
    priority: f64,
    timestamp: u64,
    id: AssertionId,
}

impl Eq for EvictEntry {}

impl PartialOrd for EvictEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Default)]
struct KbState {
    path: PathIndex,
    /// predicate → universal assertion ids mentioning it.
    universals: FxHashMap<Name, Vec<AssertionId>>,
    /// Ground/Skolemized ids, lowest priority first. Entries can go
    /// stale after retraction; the eviction loop skips them.
    evictable: BinaryHeap<Reverse<EvictEntry>>,
}

/// A named store of assertions: the global KB or one per note.
pub struct KnowledgeBase {
    id: KbId,
    capacity: usize,
    state: RwLock<KbState>,
    tms: Arc<Tms>,
    bus: Arc<EventBus>,
    config: Arc<Config>,
    ids: Arc<IdGen>,
}

impl KnowledgeBase {
    pub fn new(
        id: KbId,
        tms: Arc<Tms>,
        bus: Arc<EventBus>,
        config: Arc<Config>,
        ids: Arc<IdGen>,
    ) -> Self {
        Self {
            id,
            capacity: config.kb_capacity,
            state: RwLock::new(KbState::default()),
            tms,
            bus,
            config,
            ids,
        }
    }

    pub fn id(&self) -> &KbId {
        &self.id
    }

    /// Assertions currently stored in this KB.
    pub fn size(&self) -> usize {
        self.tms.kb_size(&self.id)
    }

    /// Admit a candidate, or explain nothing: trivial, duplicate,
    /// subsumed and over-capacity candidates all return `None`.
    pub fn commit(&self, candidate: &PotentialAssertion, source: &str) -> Option<Assertion> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if candidate.kif.is_trivial() {
            trace!(kb = %self.id, "skipping trivial candidate {}", candidate.kif);
            return None;
        }

        // Ground facts that picked up a Skolem term are stored Skolemized.
        let kind = if candidate.kind == AssertionKind::Ground && candidate.kif.contains_skolem() {
            AssertionKind::Skolemized
        } else {
            candidate.kind
        };

        if let Some(existing) = self.tms.find_exact(&self.id, &candidate.kif) {
            trace!(
                kb = %self.id,
                existing = %existing.id,
                "skipping duplicate candidate {}",
                candidate.kif
            );
            return None;
        }
        if let Some(subsumer) = self.find_subsumer(state, candidate) {
            trace!(
                kb = %self.id,
                by = %subsumer,
                "skipping subsumed candidate {}",
                candidate.kif
            );
            return None;
        }

        self.evict_for_room(state);
        if self.size() >= self.capacity {
            warn!(kb = %self.id, capacity = self.capacity, "KB full, refusing commit");
            return None;
        }

        let id = self.ids.next("fact_");
        let assertion = Assertion {
            id: id.clone(),
            kif: candidate.kif.clone(),
            priority: candidate.priority,
            timestamp: now_millis(),
            source_note_id: candidate.source_note_id.clone(),
            justifications: candidate.support.clone(),
            kind,
            negated: candidate.negated,
            equality: candidate.equality,
            oriented_equality: candidate.oriented_equality,
            quantified_vars: candidate.quantified_vars.clone(),
            derivation_depth: candidate.derivation_depth,
            active: true,
            kb_id: self.id.clone(),
        };

        let stored = self.tms.add(assertion, candidate.support.clone(), source)?;
        if stored.active {
            index_assertion(state, &stored);
        }
        debug!(kb = %self.id, id = %stored.id, ?kind, "committed {}", stored.kif);
        self.log_fill_level();
        Some(stored)
    }

    /// An active same-polarity generalization already covering the
    /// candidate, if any.
    fn find_subsumer(&self, state: &KbState, candidate: &PotentialAssertion) -> Option<AssertionId> {
        for id in state.path.find_generalizations(&candidate.kif) {
            let Some(general) = self.tms.get(&id) else {
                continue;
            };
            if !general.active
                || general.kb_id != self.id
                || general.negated != candidate.negated
                || !general.kind.is_ground_or_skolemized()
            {
                continue;
            }
            if match_terms(&general.kif, &candidate.kif, &Bindings::new()).is_some() {
                return Some(id);
            }
        }
        None
    }

    /// Poll lowest-priority ground/Skolem members until there is room.
    fn evict_for_room(&self, state: &mut KbState) {
        while self.size() >= self.capacity {
            let Some(Reverse(entry)) = state.evictable.pop() else {
                break;
            };
            let Some(victim) = self.tms.get(&entry.id) else {
                continue; // stale entry, already retracted
            };
            if victim.kb_id != self.id {
                continue;
            }
            debug!(kb = %self.id, id = %entry.id, priority = entry.priority, "evicting");
            self.tms.retract(&entry.id, "evict");
            remove_from_indexes(state, &victim);
            self.bus.publish(Event::AssertionEvicted { assertion: victim });
        }
    }

    fn log_fill_level(&self) {
        if self.capacity == 0 {
            return;
        }
        let pct = self.size() * 100 / self.capacity;
        if pct >= self.config.kb_halt_pct {
            error!(kb = %self.id, pct, "KB critically full");
        } else if pct >= self.config.kb_warn_pct {
            warn!(kb = %self.id, pct, "KB nearly full");
        }
    }

    /// Retract by id. Index maintenance follows via the status plugin.
    pub fn retract(&self, id: &AssertionId, source: &str) {
        self.tms.retract(id, source);
    }

    /// Active ground/Skolem assertions possibly unifiable with `query`.
    pub fn find_unifiable(&self, query: &Term) -> Vec<Assertion> {
        let ids = self.state.read().path.find_unifiable(query);
        self.resolve_ground(ids)
    }

    /// Active ground/Skolem assertions possibly instances of `pattern`.
    pub fn find_instances(&self, pattern: &Term) -> Vec<Assertion> {
        let ids = self.state.read().path.find_instances(pattern);
        self.resolve_ground(ids)
    }

    /// Active ground/Skolem assertions with the given root predicate.
    pub fn find_with_predicate(&self, predicate: &Name) -> Vec<Assertion> {
        let ids = self.state.read().path.ids_with_operator(predicate);
        self.resolve_ground(ids)
    }

    /// Active universal assertions indexed under `predicate`.
    pub fn find_relevant_universals(&self, predicate: &Name) -> Vec<Assertion> {
        let ids = self
            .state
            .read()
            .universals
            .get(predicate)
            .cloned()
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.tms.get(id))
            .filter(|a| a.active && a.kb_id == self.id && a.kind == AssertionKind::Universal)
            .collect()
    }

    /// Every active assertion in this KB, any kind.
    pub fn all_active(&self) -> Vec<Assertion> {
        self.tms
            .kb_members(&self.id)
            .iter()
            .filter_map(|id| self.tms.get(id))
            .filter(|a| a.active)
            .collect()
    }

    fn resolve_ground(&self, ids: Vec<SmolStr>) -> Vec<Assertion> {
        ids.iter()
            .filter_map(|id| self.tms.get(id))
            .filter(|a| a.active && a.kb_id == self.id && a.kind.is_ground_or_skolemized())
            .collect()
    }

    /// Add an assertion to the KB-side indexes. Idempotent; used after
    /// commit and when an existing assertion reactivates.
    pub fn index_assertion(&self, assertion: &Assertion) {
        index_assertion(&mut self.state.write(), assertion);
    }

    /// Drop an assertion from the KB-side indexes after retraction.
    pub fn unindex_assertion(&self, assertion: &Assertion) {
        remove_from_indexes(&mut self.state.write(), assertion);
    }
}

fn index_assertion(state: &mut KbState, assertion: &Assertion) {
    match assertion.kind {
        AssertionKind::Ground | AssertionKind::Skolemized => {
            state.path.add(&assertion.kif, &assertion.id);
            state.evictable.push(Reverse(EvictEntry {
                priority: assertion.priority,
                timestamp: assertion.timestamp,
                id: assertion.id.clone(),
            }));
        }
        AssertionKind::Universal => {
            for predicate in referenced_predicates(assertion.effective_term()) {
                let ids = state.universals.entry(predicate).or_default();
                if !ids.contains(&assertion.id) {
                    ids.push(assertion.id.clone());
                }
            }
        }
    }
}

fn remove_from_indexes(state: &mut KbState, assertion: &Assertion) {
    match assertion.kind {
        AssertionKind::Ground | AssertionKind::Skolemized => {
            state.path.remove(&assertion.kif, &assertion.id);
            // The eviction heap entry goes stale and is skipped later.
        }
        AssertionKind::Universal => {
            for predicate in referenced_predicates(assertion.effective_term()) {
                if let Some(ids) = state.universals.get_mut(&predicate) {
                    ids.retain(|id| id != &assertion.id);
                    if ids.is_empty() {
                        state.universals.remove(&predicate);
                    }
                }
            }
        }
    }
}
