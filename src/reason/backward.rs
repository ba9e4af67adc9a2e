//! Backward chaining.
//!
//! Goals are proved depth-first against registered operators, stored
//! facts and the rule set. Rule variables are renamed apart per proof
//! step so recursive rules cannot capture goal variables, a proof stack
//! avoids cycling through the same substituted goal, and results are
//! deduplicated before being returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::event::{Event, EventKind, Query, QueryAnswer, QueryKind, QueryStatus};
use crate::kb::{Assertion, AssertionId, KnowledgeBase, ReasonerContext, Rule, RuleClause};
use crate::term::{Bindings, Term, substitute_fully, unify};

pub struct BackwardChainer {
    rename_counter: AtomicU64,
}

impl BackwardChainer {
    pub fn new() -> Self {
        Self {
            rename_counter: AtomicU64::new(0),
        }
    }

    /// Prove `goal` in the given KB (plus the global KB), returning the
    /// deduplicated binding sets of every proof found within the depth
    /// budget.
    pub fn prove(
        &self,
        ctx: &Arc<ReasonerContext>,
        goal: &Term,
        kb: &Arc<KnowledgeBase>,
        bindings: &Bindings,
        depth: u32,
        stack: &mut Vec<Term>,
    ) -> Vec<Bindings> {
        if depth == 0 {
            return Vec::new();
        }
        let Some(current) = substitute_fully(goal, bindings) else {
            return Vec::new();
        };
        if stack.contains(&current) {
            return Vec::new();
        }
        stack.push(current.clone());

        let mut results: Vec<Bindings> = Vec::new();
        self.prove_with_operator(ctx, &current, bindings, &mut results);
        self.prove_with_facts(ctx, &current, kb, bindings, &mut results);
        self.prove_with_rules(ctx, &current, kb, bindings, depth, stack, &mut results);

        stack.pop();
        dedup_bindings(results)
    }

    /// A goal whose head names a registered operator is evaluated: the
    /// atom `true` succeeds outright, any other result must unify with
    /// the goal.
    fn prove_with_operator(
        &self,
        ctx: &Arc<ReasonerContext>,
        goal: &Term,
        bindings: &Bindings,
        results: &mut Vec<Bindings>,
    ) {
        let Some(operator) = goal.operator().and_then(|op| ctx.operators().get(op)) else {
            return;
        };
        let Some(items) = goal.items() else {
            return;
        };
        let args: Vec<Term> = items[1..].to_vec();
        let applied = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            operator.apply(&args, ctx.operators())
        }));
        match applied {
            Ok(Some(result)) if result == Term::atom("true") => {
                results.push(bindings.clone());
            }
            Ok(Some(result)) => {
                if let Some(extended) = unify(goal, &result, bindings) {
                    results.push(extended);
                }
            }
            Ok(None) => {
                trace!("operator branch failed for {goal}");
            }
            Err(_) => {
                tracing::error!("operator panicked evaluating {goal}");
            }
        }
    }

    fn prove_with_facts(
        &self,
        ctx: &Arc<ReasonerContext>,
        goal: &Term,
        kb: &Arc<KnowledgeBase>,
        bindings: &Bindings,
        results: &mut Vec<Bindings>,
    ) {
        let mut seen: FxHashSet<AssertionId> = FxHashSet::default();
        let mut facts: Vec<Assertion> = Vec::new();
        for fact in kb.find_unifiable(goal) {
            if seen.insert(fact.id.clone()) {
                facts.push(fact);
            }
        }
        let global = ctx.global_kb();
        if kb.id() != global.id() {
            for fact in global.find_unifiable(goal) {
                if seen.insert(fact.id.clone()) {
                    facts.push(fact);
                }
            }
        }
        for fact in facts {
            if let Some(extended) = unify(goal, &fact.kif, bindings) {
                results.push(extended);
            }
        }
    }

    fn prove_with_rules(
        &self,
        ctx: &Arc<ReasonerContext>,
        goal: &Term,
        kb: &Arc<KnowledgeBase>,
        bindings: &Bindings,
        depth: u32,
        stack: &mut Vec<Term>,
        results: &mut Vec<Bindings>,
    ) {
        for rule in ctx.rules() {
            let (consequent, antecedents) = self.rename_apart(&rule, depth);
            let Some(seed) = unify(&consequent, goal, bindings) else {
                continue;
            };
            let mut partial = vec![seed];
            for clause in &antecedents {
                let subgoal = clause.as_kif();
                let mut next = Vec::new();
                for binding in partial {
                    next.extend(self.prove(ctx, &subgoal, kb, &binding, depth - 1, stack));
                }
                partial = next;
                if partial.is_empty() {
                    break;
                }
            }
            results.extend(partial);
        }
    }

    /// Rename a rule's variables with a fresh `_d<depth>_<n>` suffix so
    /// they cannot collide with goal variables.
    fn rename_apart(&self, rule: &Rule, depth: u32) -> (Term, Vec<RuleClause>) {
        if rule.form.vars().is_empty() {
            return (rule.consequent.clone(), rule.antecedents.clone());
        }
        let n = self.rename_counter.fetch_add(1, Ordering::Relaxed);
        let mut renaming = Bindings::new();
        for var in rule.form.vars() {
            renaming.insert(var.clone(), Term::var(&format!("{var}_d{depth}_{n}")));
        }
        let consequent =
            substitute_fully(&rule.consequent, &renaming).unwrap_or_else(|| rule.consequent.clone());
        let antecedents = rule
            .antecedents
            .iter()
            .map(|clause| RuleClause {
                pattern: substitute_fully(&clause.pattern, &renaming)
                    .unwrap_or_else(|| clause.pattern.clone()),
                negated: clause.negated,
            })
            .collect();
        (consequent, antecedents)
    }

    /// Answer a query event, projecting solutions onto the pattern's
    /// variables.
    pub fn answer(&self, ctx: &Arc<ReasonerContext>, query: &Query) -> QueryAnswer {
        let kb = ctx.kb(query.kb.as_ref());
        let mut stack = Vec::new();
        let solutions = self.prove(
            ctx,
            &query.pattern,
            &kb,
            &Bindings::new(),
            ctx.config().max_backward_depth,
            &mut stack,
        );
        debug!(
            id = %query.id,
            solutions = solutions.len(),
            "query {} answered",
            query.pattern
        );

        let status = if solutions.is_empty() {
            QueryStatus::Failure
        } else {
            QueryStatus::Success
        };
        let bindings = match query.kind {
            QueryKind::AskTrueFalse => Vec::new(),
            QueryKind::AskBindings => {
                dedup_bindings(
                    solutions
                        .iter()
                        .map(|solution| project(&query.pattern, solution))
                        .collect(),
                )
            }
        };
        QueryAnswer {
            id: query.id.clone(),
            status,
            bindings,
            explanation: None,
        }
    }
}

impl Default for BackwardChainer {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Plugin for BackwardChainer {
    fn id(&self) -> &'static str {
        "backward"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::QueryRequested]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::QueryRequested { query } = event else {
            return;
        };
        let answer = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.answer(ctx, query)
        }))
        .unwrap_or_else(|_| QueryAnswer {
            id: query.id.clone(),
            status: QueryStatus::Error,
            bindings: Vec::new(),
            explanation: Some("query evaluation failed".to_owned()),
        });
        ctx.bus().publish(Event::QueryAnswered { answer });
    }
}

/// Restrict a solution to the variables of the original pattern.
fn project(pattern: &Term, solution: &Bindings) -> Bindings {
    let mut out = Bindings::new();
    for var in pattern.vars() {
        let term = Term::var(var.as_str());
        if let Some(value) = substitute_fully(&term, solution) {
            if !value.is_var() || value.as_var() != Some(var) {
                out.insert(var.clone(), value);
            }
        }
    }
    out
}

fn dedup_bindings(solutions: Vec<Bindings>) -> Vec<Bindings> {
    let mut out: Vec<Bindings> = Vec::new();
    for solution in solutions {
        if !out.contains(&solution) {
            out.push(solution);
        }
    }
    out
}
