//! Justification-based truth maintenance.
//!
//! The TMS owns every assertion in the system. It records, per
//! assertion, the literal justification set it was added with and the
//! reverse dependents graph, and keeps activation consistent: an
//! assertion is active iff it has no supporters, or every supporter
//! still exists and is active. Retraction removes the target and cascades
//! status updates through its dependents; the traversals carry a visited
//! set so self-supporting derivation cycles still terminate.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::event::{Event, EventBus};
use crate::term::{OP_NOT, Term};

use super::assertion::{Assertion, AssertionId, KbId};

/// What to do when `P` and `(not P)` are both active in one KB.
pub trait ContradictionPolicy: Send + Sync {
    fn resolve(&self, newly_active: &Assertion, opposite: &Assertion);
}

/// Default policy: report and keep both sides.
#[derive(Debug, Default)]
pub struct LogOnlyPolicy;

impl ContradictionPolicy for LogOnlyPolicy {
    fn resolve(&self, newly_active: &Assertion, opposite: &Assertion) {
        warn!(
            a = %newly_active.id,
            b = %opposite.id,
            kb = %newly_active.kb_id,
            "contradiction detected: {} vs {}",
            newly_active.kif,
            opposite.kif
        );
    }
}

#[derive(Default)]
struct TmsState {
    assertions: FxHashMap<AssertionId, Assertion>,
    /// The literal support set each assertion was added with.
    justifications: FxHashMap<AssertionId, FxHashSet<AssertionId>>,
    /// supporter id → ids citing it.
    dependents: FxHashMap<AssertionId, FxHashSet<AssertionId>>,
    /// kb id → kif → ids, for duplicate and contradiction lookups.
    by_kif: FxHashMap<KbId, FxHashMap<Term, FxHashSet<AssertionId>>>,
    /// kb id → member ids; the synchronous size used for capacity checks.
    members: FxHashMap<KbId, FxHashSet<AssertionId>>,
}

pub struct Tms {
    state: Mutex<TmsState>,
    bus: Arc<EventBus>,
    policy: Box<dyn ContradictionPolicy>,
}

impl Tms {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_policy(bus, Box::new(LogOnlyPolicy))
    }

    pub fn with_policy(bus: Arc<EventBus>, policy: Box<dyn ContradictionPolicy>) -> Self {
        Self {
            state: Mutex::new(TmsState::default()),
            bus,
            policy,
        }
    }

    /// Admit an assertion with the given justification set.
    ///
    /// Rejects id collisions and support sets citing unknown ids. The
    /// stored assertion starts active iff its support is empty or every
    /// supporter is currently active.
    pub fn add(
        &self,
        mut assertion: Assertion,
        support: FxHashSet<AssertionId>,
        source: &str,
    ) -> Option<Assertion> {
        let mut state = self.state.lock();
        if state.assertions.contains_key(&assertion.id) {
            warn!(id = %assertion.id, source, "rejecting assertion with duplicate id");
            return None;
        }
        for supporter in &support {
            if !state.assertions.contains_key(supporter) {
                warn!(
                    id = %assertion.id,
                    supporter = %supporter,
                    source,
                    "rejecting assertion citing unknown supporter"
                );
                return None;
            }
        }

        let active = support.is_empty()
            || support
                .iter()
                .all(|s| state.assertions.get(s).is_some_and(|a| a.active));
        assertion.active = active;
        assertion.justifications = support.clone();

        let id = assertion.id.clone();
        state.justifications.insert(id.clone(), support.clone());
        for supporter in &support {
            state
                .dependents
                .entry(supporter.clone())
                .or_default()
                .insert(id.clone());
        }
        state
            .by_kif
            .entry(assertion.kb_id.clone())
            .or_default()
            .entry(assertion.kif.clone())
            .or_default()
            .insert(id.clone());
        state
            .members
            .entry(assertion.kb_id.clone())
            .or_default()
            .insert(id.clone());
        state.assertions.insert(id.clone(), assertion.clone());

        trace!(id = %id, active, source, "tms add: {}", assertion.kif);
        if active {
            self.detect_contradiction(&state, &assertion);
            self.bus.publish(Event::AssertionAdded {
                assertion: assertion.clone(),
            });
        } else {
            self.bus.publish(Event::AssertionStatusChanged {
                id: id.clone(),
                kb: assertion.kb_id.clone(),
                active: false,
            });
        }
        Some(assertion)
    }

    /// Retract an assertion. Its dependents stay stored but are
    /// deactivated through a status cascade.
    pub fn retract(&self, id: &AssertionId, source: &str) {
        let mut state = self.state.lock();
        let Some(assertion) = remove_assertion(&mut state, id) else {
            trace!(id = %id, source, "retract of unknown id ignored");
            return;
        };
        debug!(id = %id, source, "retracting {}", assertion.kif);
        self.bus.publish(Event::AssertionRetracted {
            assertion,
            source: SmolStr::new(source),
        });

        let dependents: Vec<AssertionId> = state
            .dependents
            .remove(id)
            .map(|deps| deps.into_iter().collect())
            .unwrap_or_default();
        let mut visited = FxHashSet::default();
        for dependent in dependents {
            self.update_status(&mut state, &dependent, &mut visited);
        }
    }

    /// Recompute an assertion's activation after a supporter changed,
    /// recursing into its dependents on a flip.
    fn update_status(
        &self,
        state: &mut TmsState,
        id: &AssertionId,
        visited: &mut FxHashSet<AssertionId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        let Some(current) = state.assertions.get(id) else {
            return;
        };
        let was_active = current.active;
        let active = match state.justifications.get(id) {
            Some(support) if !support.is_empty() => support
                .iter()
                .all(|s| state.assertions.get(s).is_some_and(|a| a.active)),
            _ => was_active,
        };
        if active == was_active {
            return;
        }

        let assertion = {
            let entry = state
                .assertions
                .get_mut(id)
                .expect("presence checked above");
            entry.active = active;
            entry.clone()
        };
        trace!(id = %id, active, "status change: {}", assertion.kif);
        self.bus.publish(Event::AssertionStatusChanged {
            id: id.clone(),
            kb: assertion.kb_id.clone(),
            active,
        });
        if active {
            self.detect_contradiction(state, &assertion);
        }

        let dependents: Vec<AssertionId> = state
            .dependents
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default();
        for dependent in dependents {
            self.update_status(state, &dependent, visited);
        }
    }

    /// Look for the opposite polarity of a newly active assertion in the
    /// same KB and report any hit.
    fn detect_contradiction(&self, state: &TmsState, assertion: &Assertion) {
        let opposite = if assertion.negated {
            match assertion.kif.get(1) {
                Some(inner) => inner.clone(),
                None => return,
            }
        } else {
            Term::list(vec![Term::atom(OP_NOT), assertion.kif.clone()])
        };
        let Some(ids) = state
            .by_kif
            .get(&assertion.kb_id)
            .and_then(|kifs| kifs.get(&opposite))
        else {
            return;
        };
        for id in ids {
            let Some(other) = state.assertions.get(id) else {
                continue;
            };
            if !other.active {
                continue;
            }
            self.policy.resolve(assertion, other);
            self.bus.publish(Event::ContradictionDetected {
                ids: vec![assertion.id.clone(), other.id.clone()],
                kb: assertion.kb_id.clone(),
            });
        }
    }

    pub fn get(&self, id: &str) -> Option<Assertion> {
        self.state.lock().assertions.get(id).cloned()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state
            .lock()
            .assertions
            .get(id)
            .is_some_and(|a| a.active)
    }

    /// The active assertion with exactly this kif in the given KB.
    pub fn find_exact(&self, kb: &str, kif: &Term) -> Option<Assertion> {
        let state = self.state.lock();
        let ids = state.by_kif.get(kb)?.get(kif)?;
        ids.iter()
            .filter_map(|id| state.assertions.get(id))
            .find(|a| a.active)
            .cloned()
    }

    /// Synchronous member count for a KB; used for capacity checks.
    pub fn kb_size(&self, kb: &str) -> usize {
        self.state
            .lock()
            .members
            .get(kb)
            .map_or(0, FxHashSet::len)
    }

    /// All ids currently stored in a KB.
    pub fn kb_members(&self, kb: &str) -> Vec<AssertionId> {
        self.state
            .lock()
            .members
            .get(kb)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total assertions across all KBs.
    pub fn len(&self) -> usize {
        self.state.lock().assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().assertions.is_empty()
    }
}

fn remove_assertion(state: &mut TmsState, id: &AssertionId) -> Option<Assertion> {
    let assertion = state.assertions.remove(id)?;
    if let Some(support) = state.justifications.remove(id) {
        for supporter in support {
            if let Some(deps) = state.dependents.get_mut(&supporter) {
                deps.remove(id);
                if deps.is_empty() {
                    state.dependents.remove(&supporter);
                }
            }
        }
    }
    if let Some(kifs) = state.by_kif.get_mut(&assertion.kb_id) {
        if let Some(ids) = kifs.get_mut(&assertion.kif) {
            ids.remove(id);
            if ids.is_empty() {
                kifs.remove(&assertion.kif);
            }
        }
        if kifs.is_empty() {
            state.by_kif.remove(&assertion.kb_id);
        }
    }
    if let Some(members) = state.members.get_mut(&assertion.kb_id) {
        members.remove(id);
        if members.is_empty() {
            state.members.remove(&assertion.kb_id);
        }
    }
    Some(assertion)
}
