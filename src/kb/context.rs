//! Shared reasoning state: KBs, rules, operators, TMS, Skolemizer.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::debug;

use crate::base::{Config, IdGen, RunGate};
use crate::event::{Event, EventBus};
use crate::reason::operators::OperatorRegistry;
use crate::term::Term;

use super::assertion::{Assertion, AssertionId, KbId, NoteId, Rule};
use super::skolem::Skolemizer;
use super::store::KnowledgeBase;
use super::tms::Tms;
use super::GLOBAL_KB;

/// Everything the reasoner plugins share.
///
/// Owns the global KB, the per-note KBs, the rule set, the operator
/// registry, the TMS and the Skolemizer, and provides the derived
/// depth/priority/common-source helpers used when emitting candidates.
pub struct ReasonerContext {
    config: Arc<Config>,
    bus: Arc<EventBus>,
    tms: Arc<Tms>,
    ids: Arc<IdGen>,
    gate: Arc<RunGate>,
    global: Arc<KnowledgeBase>,
    notes: RwLock<IndexMap<NoteId, Arc<KnowledgeBase>>>,
    rules: RwLock<IndexMap<Term, Arc<Rule>>>,
    operators: OperatorRegistry,
    skolemizer: Skolemizer,
}

impl ReasonerContext {
    pub fn new(config: Arc<Config>, bus: Arc<EventBus>, gate: Arc<RunGate>) -> Self {
        let tms = Arc::new(Tms::new(Arc::clone(&bus)));
        let ids = Arc::new(IdGen::new());
        let global = Arc::new(KnowledgeBase::new(
            SmolStr::new(GLOBAL_KB),
            Arc::clone(&tms),
            Arc::clone(&bus),
            Arc::clone(&config),
            Arc::clone(&ids),
        ));
        Self {
            skolemizer: Skolemizer::new(Arc::clone(&ids)),
            config,
            bus,
            tms,
            ids,
            gate,
            global,
            notes: RwLock::new(IndexMap::new()),
            rules: RwLock::new(IndexMap::new()),
            operators: OperatorRegistry::with_builtins(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn tms(&self) -> &Arc<Tms> {
        &self.tms
    }

    pub fn ids(&self) -> &Arc<IdGen> {
        &self.ids
    }

    pub fn gate(&self) -> &Arc<RunGate> {
        &self.gate
    }

    pub fn global_kb(&self) -> &Arc<KnowledgeBase> {
        &self.global
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn skolemizer(&self) -> &Skolemizer {
        &self.skolemizer
    }

    /// The KB for a note id, created on first use; `None` targets the
    /// global KB.
    pub fn kb(&self, note: Option<&NoteId>) -> Arc<KnowledgeBase> {
        let Some(note) = note else {
            return Arc::clone(&self.global);
        };
        if let Some(existing) = self.notes.read().get(note) {
            return Arc::clone(existing);
        }
        let mut notes = self.notes.write();
        Arc::clone(notes.entry(note.clone()).or_insert_with(|| {
            debug!(note = %note, "creating note KB");
            Arc::new(KnowledgeBase::new(
                note.clone(),
                Arc::clone(&self.tms),
                Arc::clone(&self.bus),
                Arc::clone(&self.config),
                Arc::clone(&self.ids),
            ))
        }))
    }

    /// Look a KB up by its id without creating it.
    pub fn kb_by_id(&self, kb_id: &KbId) -> Option<Arc<KnowledgeBase>> {
        if kb_id.as_str() == GLOBAL_KB {
            return Some(Arc::clone(&self.global));
        }
        self.notes.read().get(kb_id).cloned()
    }

    /// Drop a note KB entirely. Assertions must already be retracted.
    pub fn remove_note_kb(&self, note: &NoteId) -> bool {
        self.notes.write().shift_remove(note).is_some()
    }

    pub fn note_ids(&self) -> Vec<NoteId> {
        self.notes.read().keys().cloned().collect()
    }

    /// Find an assertion in any KB.
    pub fn find_assertion(&self, id: &str) -> Option<Assertion> {
        self.tms.get(id)
    }

    /// Add a rule, publishing `RuleAdded`. Returns `false` when a rule
    /// with the same form is already present.
    pub fn add_rule(&self, rule: Rule) -> bool {
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.form) {
            return false;
        }
        debug!(id = %rule.id, "adding rule {}", rule.form);
        let rule = Arc::new(rule);
        rules.insert(rule.form.clone(), Arc::clone(&rule));
        drop(rules);
        self.bus.publish(Event::RuleAdded {
            rule: Rule::clone(&rule),
        });
        true
    }

    /// Remove any rule whose form equals `form`, publishing
    /// `RuleRemoved`.
    pub fn remove_rule_by_form(&self, form: &Term) -> bool {
        let removed = self.rules.write().shift_remove(form);
        match removed {
            Some(rule) => {
                debug!(id = %rule.id, "removing rule {}", rule.form);
                self.bus.publish(Event::RuleRemoved {
                    rule: Rule::clone(&rule),
                });
                true
            }
            None => false,
        }
    }

    /// Snapshot of the current rule set.
    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules.read().values().cloned().collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// `max(depth of support) + 1`; base facts are depth 0.
    pub fn derived_depth(&self, support: &FxHashSet<AssertionId>) -> u32 {
        support
            .iter()
            .filter_map(|id| self.tms.get(id))
            .map(|a| a.derivation_depth)
            .max()
            .map_or(0, |depth| depth + 1)
    }

    /// `min(priority of support) × decay`, or the input base priority
    /// for an empty support set.
    pub fn derived_priority(&self, support: &FxHashSet<AssertionId>) -> f64 {
        let minimum = support
            .iter()
            .filter_map(|id| self.tms.get(id))
            .map(|a| a.priority)
            .fold(f64::INFINITY, f64::min);
        if minimum.is_finite() {
            minimum * self.config.derived_priority_decay
        } else {
            self.config.input_priority_base
        }
    }

    /// The single note id shared by every justification, or `None` when
    /// the justifications disagree or any lacks one.
    pub fn common_source_note(&self, support: &FxHashSet<AssertionId>) -> Option<NoteId> {
        let mut common: Option<NoteId> = None;
        for id in support {
            let note = self.tms.get(id)?.source_note_id?;
            if let Some(existing) = &common {
                if *existing != note {
                    return None;
                }
            } else {
                common = Some(note);
            }
        }
        common
    }
}
