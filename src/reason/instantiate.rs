//! Universal instantiation.
//!
//! A stored `(forall vars body)` fact is instantiated against ground
//! facts: any sub-expression of the body that one-way-matches a ground
//! fact's effective term, binding exactly the quantified variables,
//! yields the body with those bindings substituted in. Both directions
//! fire: a new ground fact is tried against the universals indexed under
//! its predicate, and a new universal is tried against the ground facts
//! with the predicates it references.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::trace;

use crate::event::{Event, EventKind};
use crate::kb::{
    Assertion, AssertionId, AssertionKind, KnowledgeBase, PotentialAssertion, ReasonerContext,
    referenced_predicates,
};
use crate::term::{Bindings, Term, match_terms, substitute_fully};

pub struct InstantiationPlugin;

impl super::Plugin for InstantiationPlugin {
    fn id(&self) -> &'static str {
        "instantiate"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::AssertionAdded]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::AssertionAdded { assertion } = event else {
            return;
        };
        let Some(kb) = ctx.kb_by_id(&assertion.kb_id) else {
            return;
        };
        match assertion.kind {
            AssertionKind::Ground | AssertionKind::Skolemized => {
                ground_against_universals(ctx, assertion, &kb);
            }
            AssertionKind::Universal => {
                universal_against_ground(ctx, assertion, &kb);
            }
        }
    }
}

fn ground_against_universals(
    ctx: &Arc<ReasonerContext>,
    fact: &Assertion,
    kb: &Arc<KnowledgeBase>,
) {
    let Some(predicate) = fact.predicate().cloned() else {
        return;
    };
    let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
    let mut universals = Vec::new();
    for universal in kb.find_relevant_universals(&predicate) {
        if seen.insert(universal.id.clone()) {
            universals.push(universal);
        }
    }
    let global = ctx.global_kb();
    if kb.id() != global.id() {
        for universal in global.find_relevant_universals(&predicate) {
            if seen.insert(universal.id.clone()) {
                universals.push(universal);
            }
        }
    }
    for universal in universals {
        if universal.derivation_depth >= ctx.config().max_derivation_depth {
            continue;
        }
        instantiate(ctx, &universal, fact);
    }
}

fn universal_against_ground(
    ctx: &Arc<ReasonerContext>,
    universal: &Assertion,
    kb: &Arc<KnowledgeBase>,
) {
    if universal.derivation_depth >= ctx.config().max_derivation_depth {
        return;
    }
    let predicates = referenced_predicates(universal.effective_term());
    let global = ctx.global_kb();
    let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
    for predicate in &predicates {
        for fact in kb.find_with_predicate(predicate) {
            if seen.insert(fact.id.clone()) {
                instantiate(ctx, universal, &fact);
            }
        }
        if kb.id() != global.id() {
            for fact in global.find_with_predicate(predicate) {
                if seen.insert(fact.id.clone()) {
                    instantiate(ctx, universal, &fact);
                }
            }
        }
    }
}

/// Try every sub-expression of the universal's body against the fact.
fn instantiate(ctx: &Arc<ReasonerContext>, universal: &Assertion, fact: &Assertion) {
    let body = universal.effective_term().clone();
    let quantified: FxHashSet<&str> = universal
        .quantified_vars
        .iter()
        .map(|v| v.as_str())
        .collect();
    let mut emitted: FxHashSet<Term> = FxHashSet::default();

    for sub in body.subterms() {
        if !sub.is_list() {
            continue;
        }
        let Some(bindings) = match_terms(sub, fact.effective_term(), &Bindings::new()) else {
            continue;
        };
        // The match must bind exactly the quantified variable set.
        let bound: FxHashSet<&str> = bindings.names().map(|n| n.as_str()).collect();
        if bound != quantified {
            continue;
        }
        let Some(result) = substitute_fully(&body, &bindings) else {
            continue;
        };
        if !result.is_list()
            || result.contains_variable()
            || result.is_trivial()
            || !emitted.insert(result.clone())
        {
            continue;
        }
        emit(ctx, universal, fact, result);
    }
}

fn emit(ctx: &Arc<ReasonerContext>, universal: &Assertion, fact: &Assertion, result: Term) {
    let mut support: FxHashSet<AssertionId> = FxHashSet::default();
    support.extend(universal.justifications.iter().cloned());
    support.extend(fact.justifications.iter().cloned());
    support.insert(universal.id.clone());
    support.insert(fact.id.clone());

    let depth = universal.derivation_depth.max(fact.derivation_depth) + 1;
    if depth > ctx.config().max_derivation_depth {
        trace!(universal = %universal.id, fact = %fact.id, depth, "instantiation over depth cap");
        return;
    }
    if result.weight() > ctx.config().max_derived_weight {
        trace!(universal = %universal.id, fact = %fact.id, "instantiation over weight cap");
        return;
    }

    let kind = if result.contains_skolem() {
        AssertionKind::Skolemized
    } else {
        AssertionKind::Ground
    };
    let priority = ctx.derived_priority(&support);
    let note = ctx.common_source_note(&support);
    let candidate = PotentialAssertion::new(
        result,
        priority,
        SmolStr::new(format!("ui:{}", universal.id)),
    )
    .with_support(support)
    .with_depth(depth)
    .with_kind(kind)
    .with_note(note);
    ctx.bus().publish(Event::AssertionCandidate { candidate });
}
