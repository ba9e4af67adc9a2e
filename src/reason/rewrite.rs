//! Ordered-equality rewriting.
//!
//! An oriented equality `(= lhs rhs)` with a strictly heavier lhs acts
//! as a left-to-right rewrite rule. A new equality is applied to every
//! existing ground fact in its KB plus the global KB, and a new ground
//! fact is run through every existing oriented equality. The original
//! assertion remains; the rewritten form is committed alongside it,
//! citing both.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::trace;

use crate::event::{Event, EventKind};
use crate::kb::{
    Assertion, AssertionId, AssertionKind, KnowledgeBase, PotentialAssertion, ReasonerContext,
};
use crate::term::{OP_EQUAL, Term, rewrite};

pub struct RewritePlugin;

impl super::Plugin for RewritePlugin {
    fn id(&self) -> &'static str {
        "rewrite"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::AssertionAdded]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::AssertionAdded { assertion } = event else {
            return;
        };
        if !assertion.kind.is_ground_or_skolemized() {
            return;
        }
        let Some(kb) = ctx.kb_by_id(&assertion.kb_id) else {
            return;
        };

        if assertion.oriented_equality {
            apply_equality_to_existing(ctx, assertion, &kb);
        }
        apply_existing_equalities(ctx, assertion, &kb);
    }
}

/// A new oriented equality rewrites every other ground fact in scope.
fn apply_equality_to_existing(
    ctx: &Arc<ReasonerContext>,
    equality: &Assertion,
    kb: &Arc<KnowledgeBase>,
) {
    for target in ground_facts(ctx, kb) {
        if target.id == equality.id {
            continue;
        }
        try_rewrite(ctx, equality, &target);
    }
}

/// Every oriented equality already in scope rewrites the new fact.
fn apply_existing_equalities(
    ctx: &Arc<ReasonerContext>,
    target: &Assertion,
    kb: &Arc<KnowledgeBase>,
) {
    for equality in scoped_equalities(ctx, kb) {
        if equality.id == target.id {
            continue;
        }
        try_rewrite(ctx, &equality, target);
    }
}

fn try_rewrite(ctx: &Arc<ReasonerContext>, equality: &Assertion, target: &Assertion) {
    let (Some(lhs), Some(rhs)) = (equality.kif.get(1), equality.kif.get(2)) else {
        return;
    };
    let Some(rewritten) = rewrite(&target.kif, lhs, rhs) else {
        return;
    };
    if rewritten == target.kif || !rewritten.is_list() || rewritten.is_trivial() {
        return;
    }

    let mut support: FxHashSet<AssertionId> = FxHashSet::default();
    support.extend(equality.justifications.iter().cloned());
    support.extend(target.justifications.iter().cloned());
    support.insert(equality.id.clone());
    support.insert(target.id.clone());

    let depth = equality.derivation_depth.max(target.derivation_depth) + 1;
    if depth > ctx.config().max_derivation_depth {
        trace!(equality = %equality.id, target = %target.id, depth, "rewrite over depth cap");
        return;
    }
    if rewritten.weight() > ctx.config().max_derived_weight {
        trace!(equality = %equality.id, target = %target.id, "rewrite over weight cap");
        return;
    }

    let kind = if rewritten.contains_skolem() {
        AssertionKind::Skolemized
    } else {
        AssertionKind::Ground
    };
    let priority = ctx.derived_priority(&support);
    let note = ctx.common_source_note(&support);
    let candidate = PotentialAssertion::new(
        rewritten,
        priority,
        SmolStr::new(format!("rw:{}", equality.id)),
    )
    .with_support(support)
    .with_depth(depth)
    .with_kind(kind)
    .with_note(note);
    ctx.bus().publish(Event::AssertionCandidate { candidate });
}

fn ground_facts(ctx: &Arc<ReasonerContext>, kb: &Arc<KnowledgeBase>) -> Vec<Assertion> {
    let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
    let mut out: Vec<Assertion> = Vec::new();
    let mut push = |assertions: Vec<Assertion>| {
        for assertion in assertions {
            if assertion.kind.is_ground_or_skolemized() && seen.insert(assertion.id.clone()) {
                out.push(assertion);
            }
        }
    };
    push(kb.all_active());
    let global = ctx.global_kb();
    if kb.id() != global.id() {
        push(global.all_active());
    }
    out
}

fn scoped_equalities(ctx: &Arc<ReasonerContext>, kb: &Arc<KnowledgeBase>) -> Vec<Assertion> {
    let equals = crate::base::Name::new(OP_EQUAL);
    let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
    let mut out: Vec<Assertion> = Vec::new();
    let mut push = |assertions: Vec<Assertion>| {
        for assertion in assertions {
            if assertion.oriented_equality && seen.insert(assertion.id.clone()) {
                out.push(assertion);
            }
        }
    };
    push(kb.find_with_predicate(&equals));
    let global = ctx.global_kb();
    if kb.id() != global.id() {
        push(global.find_with_predicate(&equals));
    }
    out
}
