//! Forward chaining.
//!
//! A newly added ground or Skolemized assertion is tried as the trigger
//! for every clause of every rule. When the trigger unifies, the
//! remaining clauses are matched against the assertion's KB plus the
//! global KB, threading bindings left to right; each complete match
//! processes the rule's consequent into candidate assertions or derived
//! rules, under the derivation depth and term weight budgets.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{trace, warn};

use crate::event::{Event, EventKind};
use crate::kb::{
    Assertion, AssertionId, AssertionKind, KnowledgeBase, PotentialAssertion, ReasonerContext,
    Rule, RuleClause, parse_quantified_vars,
};
use crate::term::{
    Bindings, OP_AND, OP_EXISTS, OP_FORALL, OP_NOT, Term, substitute_fully, unify,
};

pub struct ForwardChainer;

impl super::Plugin for ForwardChainer {
    fn id(&self) -> &'static str {
        "forward"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::AssertionAdded, EventKind::RuleAdded]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        match event {
            Event::AssertionAdded { assertion } => {
                if !assertion.kind.is_ground_or_skolemized() {
                    return;
                }
                let Some(kb) = ctx.kb_by_id(&assertion.kb_id) else {
                    return;
                };
                for rule in ctx.rules() {
                    trigger_rule(ctx, &rule, assertion, &kb);
                }
            }
            // A new rule re-scans the facts already committed, so rule
            // and fact arrival order does not matter.
            Event::RuleAdded { rule } => {
                let mut kbs = vec![Arc::clone(ctx.global_kb())];
                for note in ctx.note_ids() {
                    if let Some(kb) = ctx.kb_by_id(&note) {
                        kbs.push(kb);
                    }
                }
                for kb in kbs {
                    for fact in kb.all_active() {
                        if fact.kind.is_ground_or_skolemized() {
                            trigger_rule(ctx, rule, &fact, &kb);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn trigger_rule(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    assertion: &Assertion,
    kb: &Arc<KnowledgeBase>,
) {
    for (index, clause) in rule.antecedents.iter().enumerate() {
        if clause.negated != assertion.negated {
            continue;
        }
        let Some(seed) = unify(&clause.pattern, assertion.effective_term(), &Bindings::new())
        else {
            continue;
        };
        let mut support = FxHashSet::default();
        support.insert(assertion.id.clone());
        let remaining: Vec<&RuleClause> = rule
            .antecedents
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| c)
            .collect();
        for (bindings, support) in solve_clauses(ctx, &remaining, seed.clone(), support, kb) {
            process_consequent(ctx, rule, &bindings, support);
        }
    }
}

/// Match the remaining clauses against the trigger KB plus the global
/// KB, accumulating bindings and support.
fn solve_clauses(
    ctx: &Arc<ReasonerContext>,
    clauses: &[&RuleClause],
    bindings: Bindings,
    support: FxHashSet<AssertionId>,
    kb: &Arc<KnowledgeBase>,
) -> Vec<(Bindings, FxHashSet<AssertionId>)> {
    let Some((clause, rest)) = clauses.split_first() else {
        return vec![(bindings, support)];
    };
    let mut results = Vec::new();
    for candidate in clause_candidates(ctx, clause, &bindings, kb) {
        if candidate.negated != clause.negated {
            continue;
        }
        let Some(extended) = unify(&clause.pattern, candidate.effective_term(), &bindings) else {
            continue;
        };
        let mut extended_support = support.clone();
        extended_support.insert(candidate.id.clone());
        results.extend(solve_clauses(ctx, rest, extended, extended_support, kb));
    }
    results
}

/// Candidate facts for one clause, deduplicated across the trigger KB
/// and the global KB.
fn clause_candidates(
    ctx: &Arc<ReasonerContext>,
    clause: &RuleClause,
    bindings: &Bindings,
    kb: &Arc<KnowledgeBase>,
) -> Vec<Assertion> {
    let pattern = substitute_fully(&clause.pattern, bindings)
        .unwrap_or_else(|| clause.pattern.clone());
    let query = if clause.negated {
        Term::list(vec![Term::atom(OP_NOT), pattern])
    } else {
        pattern
    };
    let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
    let mut out = Vec::new();
    for found in kb.find_unifiable(&query) {
        if seen.insert(found.id.clone()) {
            out.push(found);
        }
    }
    let global = ctx.global_kb();
    if kb.id() != global.id() {
        for found in global.find_unifiable(&query) {
            if seen.insert(found.id.clone()) {
                out.push(found);
            }
        }
    }
    out
}

fn process_consequent(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    bindings: &Bindings,
    support: FxHashSet<AssertionId>,
) {
    let Some(term) = substitute_fully(&rule.consequent, bindings) else {
        return;
    };
    dispatch(ctx, rule, simplify_negations(&term), bindings, support);
}

/// `(not (not X)) → X`, applied recursively through subterms.
fn simplify_negations(term: &Term) -> Term {
    if term.operator().is_some_and(|op| op.as_str() == OP_NOT) && term.len() == 2 {
        let inner = term.get(1).expect("arity checked");
        if inner.operator().is_some_and(|op| op.as_str() == OP_NOT) && inner.len() == 2 {
            return simplify_negations(inner.get(1).expect("arity checked"));
        }
    }
    match term.items() {
        Some(items) => Term::list(items.iter().map(simplify_negations).collect()),
        None => term.clone(),
    }
}

fn dispatch(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    term: Term,
    bindings: &Bindings,
    support: FxHashSet<AssertionId>,
) {
    let operator = term.operator().map(|op| op.as_str().to_owned());
    match operator.as_deref() {
        Some(OP_AND) => {
            let Some(items) = term.items() else { return };
            for conjunct in &items[1..] {
                dispatch(ctx, rule, conjunct.clone(), bindings, support.clone());
            }
        }
        Some(OP_FORALL) if term.len() == 3 => {
            let body = term.get(2).expect("arity checked");
            if Rule::is_rule_form(body) {
                derive_rule(ctx, rule, body, &support);
            } else {
                emit_universal(ctx, rule, &term, support);
            }
        }
        Some(OP_EXISTS) if term.len() == 3 => {
            let vars = term.get(1).expect("arity checked");
            let body = term.get(2).expect("arity checked");
            match ctx.skolemizer().skolemize(vars, body, bindings) {
                Ok(skolemized) => emit_ground(
                    ctx,
                    rule,
                    skolemized,
                    AssertionKind::Skolemized,
                    support,
                ),
                Err(error) => warn!(rule = %rule.id, %error, "skipping malformed exists"),
            }
        }
        _ => {
            let kind = if term.contains_skolem() {
                AssertionKind::Skolemized
            } else {
                AssertionKind::Ground
            };
            emit_ground(ctx, rule, term, kind, support);
        }
    }
}

fn derive_rule(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    form: &Term,
    support: &FxHashSet<AssertionId>,
) {
    let depth = ctx.derived_depth(support);
    if depth > ctx.config().max_derivation_depth {
        trace!(rule = %rule.id, depth, "derived rule over depth cap");
        return;
    }
    let priority = ctx.derived_priority(support);
    match Rule::expand(form, || ctx.ids().next("rule_"), priority) {
        Ok(derived) => {
            for derived_rule in derived {
                trace!(from = %rule.id, "derived rule {}", derived_rule.form);
                ctx.add_rule(derived_rule);
            }
        }
        Err(error) => warn!(rule = %rule.id, %error, "skipping malformed derived rule"),
    }
}

fn emit_universal(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    term: &Term,
    support: FxHashSet<AssertionId>,
) {
    let Some(vars_spec) = term.get(1) else { return };
    let vars = match parse_quantified_vars(vars_spec) {
        Ok(vars) => vars,
        Err(error) => {
            warn!(rule = %rule.id, %error, "skipping malformed derived forall");
            return;
        }
    };
    let Some(candidate) = budgeted_candidate(ctx, rule, term.clone(), &support) else {
        return;
    };
    let candidate = candidate
        .with_kind(AssertionKind::Universal)
        .with_quantified_vars(vars);
    ctx.bus().publish(Event::AssertionCandidate { candidate });
}

fn emit_ground(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    term: Term,
    kind: AssertionKind,
    support: FxHashSet<AssertionId>,
) {
    if !term.is_list() || term.contains_variable() || term.is_trivial() {
        trace!(rule = %rule.id, "dropping consequent {term}");
        return;
    }
    let Some(candidate) = budgeted_candidate(ctx, rule, term, &support) else {
        return;
    };
    let candidate = candidate.with_kind(kind);
    ctx.bus().publish(Event::AssertionCandidate { candidate });
}

/// Build a supported candidate, or `None` when the depth or weight
/// budget is exceeded.
fn budgeted_candidate(
    ctx: &Arc<ReasonerContext>,
    rule: &Rule,
    kif: Term,
    support: &FxHashSet<AssertionId>,
) -> Option<PotentialAssertion> {
    let depth = ctx.derived_depth(support);
    if depth > ctx.config().max_derivation_depth {
        trace!(rule = %rule.id, depth, "derivation over depth cap");
        return None;
    }
    if kif.weight() > ctx.config().max_derived_weight {
        trace!(rule = %rule.id, weight = kif.weight(), "derivation over weight cap");
        return None;
    }
    let priority = ctx.derived_priority(support);
    let note = ctx.common_source_note(support);
    Some(
        PotentialAssertion::new(kif, priority, SmolStr::new(format!("fc:{}", rule.id)))
            .with_support(support.clone())
            .with_depth(depth)
            .with_note(note),
    )
}
