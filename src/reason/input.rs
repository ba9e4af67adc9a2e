//! External input routing.
//!
//! Raw terms arrive with a source id and an optional target note. Rule
//! forms become rules, `exists` forms are Skolemized and resubmitted,
//! `forall` forms become rules or universal candidates, and plain ground
//! lists become ground candidates. Anything else is dropped with a
//! warning.

use std::sync::Arc;

use smol_str::SmolStr;
use tracing::warn;

use crate::event::{Event, EventKind};
use crate::kb::{
    AssertionKind, NoteId, PotentialAssertion, ReasonerContext, Rule, ValidationError,
};
use crate::term::{Bindings, OP_AND, OP_EQUIV, OP_EXISTS, OP_FORALL, OP_IMPLIES, OP_NOT, Term};

pub struct InputPlugin;

impl super::Plugin for InputPlugin {
    fn id(&self) -> &'static str {
        "input"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::InputReceived]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::InputReceived { term, source, note } = event else {
            return;
        };
        if let Err(error) = route(ctx, term, source, note.as_ref()) {
            warn!(%source, %error, "dropping invalid input {term}");
        }
    }
}

/// Route one external term.
fn route(
    ctx: &Arc<ReasonerContext>,
    term: &Term,
    source: &SmolStr,
    note: Option<&NoteId>,
) -> Result<(), ValidationError> {
    let Some(operator) = term.operator().map(|op| op.as_str().to_owned()) else {
        return Err(ValidationError::NotGround(term.to_string()));
    };
    match operator.as_str() {
        OP_IMPLIES | OP_EQUIV => add_rule_form(ctx, term),
        OP_EXISTS => {
            let (vars, body) = quantifier_parts(term, "exists")?;
            let skolemized = ctx.skolemizer().skolemize(vars, body, &Bindings::new())?;
            route(ctx, &skolemized, source, note)
        }
        OP_FORALL => route_forall(ctx, term, source, note),
        OP_AND => {
            // A top-level conjunction is just several assertions.
            let items = term.items().expect("operator implies list");
            for conjunct in &items[1..] {
                route(ctx, conjunct, source, note)?;
            }
            Ok(())
        }
        _ => submit_plain(ctx, term, source, note),
    }
}

fn add_rule_form(ctx: &Arc<ReasonerContext>, form: &Term) -> Result<(), ValidationError> {
    let priority = ctx.config().input_priority_base;
    let rules = Rule::expand(form, || ctx.ids().next("rule_"), priority)?;
    for rule in rules {
        ctx.add_rule(rule);
    }
    Ok(())
}

fn route_forall(
    ctx: &Arc<ReasonerContext>,
    term: &Term,
    source: &SmolStr,
    note: Option<&NoteId>,
) -> Result<(), ValidationError> {
    let (vars_spec, body) = quantifier_parts(term, "forall")?;
    if Rule::is_rule_form(body) {
        return add_rule_form(ctx, body);
    }
    let vars = crate::kb::parse_quantified_vars(vars_spec)?;
    if !body.is_list() {
        return Err(ValidationError::BadQuantifiedForm {
            kind: "forall",
            form: term.to_string(),
        });
    }
    let priority = priority_for(ctx, term, note);
    let candidate = PotentialAssertion::new(term.clone(), priority, SmolStr::new(source))
        .with_kind(AssertionKind::Universal)
        .with_quantified_vars(vars)
        .with_note(note.cloned());
    ctx.bus().publish(Event::AssertionCandidate { candidate });
    Ok(())
}

fn submit_plain(
    ctx: &Arc<ReasonerContext>,
    term: &Term,
    source: &SmolStr,
    note: Option<&NoteId>,
) -> Result<(), ValidationError> {
    if term.contains_variable() {
        return Err(ValidationError::NotGround(term.to_string()));
    }
    if term.operator().is_some_and(|op| op.as_str() == OP_NOT) && term.len() != 2 {
        return Err(ValidationError::BadNegationArity(term.to_string()));
    }
    let priority = priority_for(ctx, term, note);
    let candidate = PotentialAssertion::new(term.clone(), priority, SmolStr::new(source))
        .with_note(note.cloned());
    ctx.bus().publish(Event::AssertionCandidate { candidate });
    Ok(())
}

/// `base / (1 + weight)`, with the note base when a note is attached.
fn priority_for(ctx: &Arc<ReasonerContext>, term: &Term, note: Option<&NoteId>) -> f64 {
    ctx.config().base_priority(note.is_some()) / (1.0 + f64::from(term.weight()))
}

fn quantifier_parts<'t>(
    term: &'t Term,
    kind: &'static str,
) -> Result<(&'t Term, &'t Term), ValidationError> {
    if term.len() != 3 {
        return Err(ValidationError::BadQuantifiedForm {
            kind,
            form: term.to_string(),
        });
    }
    Ok((
        term.get(1).expect("arity checked"),
        term.get(2).expect("arity checked"),
    ))
}
