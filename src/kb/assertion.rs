//! Assertions, potential assertions and rules.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use thiserror::Error;

use crate::base::Name;
use crate::term::{OP_AND, OP_EQUIV, OP_IMPLIES, OP_NOT, Term};

pub type AssertionId = SmolStr;
pub type KbId = SmolStr;
pub type NoteId = SmolStr;

/// Structurally invalid input that the engine drops with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rule form must be (=> ant con) or (<=> a b), got: {0}")]
    BadRuleForm(String),
    #[error("antecedent clause must be a list or (not <list>): {0}")]
    BadClause(String),
    #[error("'not' takes exactly one argument: {0}")]
    BadNegationArity(String),
    #[error("top-level assertion must be a ground list: {0}")]
    NotGround(String),
    #[error("malformed quantifier variable spec: {0}")]
    BadQuantifierSpec(String),
    #[error("malformed {kind} form: {form}")]
    BadQuantifiedForm { kind: &'static str, form: String },
}

/// How an assertion is stored and indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    /// Variable-free, indexed in the path trie, evictable.
    Ground,
    /// A `(forall vars body)` fact, indexed by referenced predicate.
    Universal,
    /// Ground but mentioning a Skolem term.
    Skolemized,
}

impl AssertionKind {
    pub fn is_ground_or_skolemized(self) -> bool {
        matches!(self, AssertionKind::Ground | AssertionKind::Skolemized)
    }
}

/// A committed term with identity, justifications and activation status.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub id: AssertionId,
    pub kif: Term,
    pub priority: f64,
    pub timestamp: u64,
    pub source_note_id: Option<NoteId>,
    pub justifications: FxHashSet<AssertionId>,
    pub kind: AssertionKind,
    pub negated: bool,
    pub equality: bool,
    pub oriented_equality: bool,
    pub quantified_vars: Box<[Name]>,
    pub derivation_depth: u32,
    pub active: bool,
    pub kb_id: KbId,
}

impl Assertion {
    /// The term reasoners actually work with: the body under `not` for a
    /// negated assertion, the quantified body for a universal, the kif
    /// itself otherwise.
    pub fn effective_term(&self) -> &Term {
        if self.negated {
            self.kif.get(1).unwrap_or(&self.kif)
        } else if self.kind == AssertionKind::Universal {
            self.kif.get(2).unwrap_or(&self.kif)
        } else {
            &self.kif
        }
    }

    /// The predicate under which ground facts are grouped.
    pub fn predicate(&self) -> Option<&Name> {
        self.effective_term().operator()
    }

    /// Descending desirability: active before inactive, higher priority,
    /// lower derivation depth, newer timestamp.
    pub fn cmp_desirability(&self, other: &Assertion) -> Ordering {
        self.active
            .cmp(&other.active)
            .then_with(|| self.priority.total_cmp(&other.priority))
            .then_with(|| other.derivation_depth.cmp(&self.derivation_depth))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .reverse()
    }
}

/// A candidate not yet admitted to a knowledge base.
///
/// Equality and hash are by kif alone so candidate streams deduplicate.
#[derive(Debug, Clone)]
pub struct PotentialAssertion {
    pub kif: Term,
    pub priority: f64,
    pub support: FxHashSet<AssertionId>,
    pub source_id: SmolStr,
    pub negated: bool,
    pub equality: bool,
    pub oriented_equality: bool,
    pub source_note_id: Option<NoteId>,
    pub kind: AssertionKind,
    pub quantified_vars: Box<[Name]>,
    pub derivation_depth: u32,
}

impl PotentialAssertion {
    /// A direct, unsupported candidate of the given kind.
    pub fn new(kif: Term, priority: f64, source_id: SmolStr) -> Self {
        let negated = kif.operator().is_some_and(|op| op.as_str() == OP_NOT);
        let equality = kif.operator().is_some_and(|op| op.as_str() == crate::term::OP_EQUAL);
        let oriented_equality = equality
            && match (kif.get(1), kif.get(2)) {
                (Some(lhs), Some(rhs)) => lhs.weight() > rhs.weight(),
                _ => false,
            };
        Self {
            kif,
            priority,
            support: FxHashSet::default(),
            source_id,
            negated,
            equality,
            oriented_equality,
            source_note_id: None,
            kind: AssertionKind::Ground,
            quantified_vars: Box::new([]),
            derivation_depth: 0,
        }
    }

    pub fn with_support(mut self, support: FxHashSet<AssertionId>) -> Self {
        self.support = support;
        self
    }

    pub fn with_note(mut self, note: Option<NoteId>) -> Self {
        self.source_note_id = note;
        self
    }

    pub fn with_kind(mut self, kind: AssertionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_quantified_vars(mut self, vars: Vec<Name>) -> Self {
        self.quantified_vars = vars.into();
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.derivation_depth = depth;
        self
    }
}

impl PartialEq for PotentialAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.kif == other.kif
    }
}

impl Eq for PotentialAssertion {}

impl Hash for PotentialAssertion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kif.hash(state);
    }
}

/// One clause of a rule antecedent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleClause {
    pub pattern: Term,
    pub negated: bool,
}

impl RuleClause {
    /// The clause as it would appear as a stored kif: `(not pattern)`
    /// when negated, the pattern itself otherwise.
    pub fn as_kif(&self) -> Term {
        if self.negated {
            Term::list(vec![Term::atom(OP_NOT), self.pattern.clone()])
        } else {
            self.pattern.clone()
        }
    }
}

/// An implication whose variables are universally quantified over its
/// free variables. Equality and hash are by form only.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: SmolStr,
    pub form: Term,
    pub antecedent: Term,
    pub consequent: Term,
    pub priority: f64,
    pub antecedents: Vec<RuleClause>,
}

impl Rule {
    /// Parse a single `(=> antecedent consequent)` form.
    pub fn parse(form: Term, id: SmolStr, priority: f64) -> Result<Rule, ValidationError> {
        let op = form
            .operator()
            .ok_or_else(|| ValidationError::BadRuleForm(form.to_string()))?
            .clone();
        if op.as_str() != OP_IMPLIES || form.len() != 3 {
            return Err(ValidationError::BadRuleForm(form.to_string()));
        }
        let antecedent = form.get(1).cloned().unwrap_or_else(|| Term::atom("true"));
        let consequent = form.get(2).cloned().unwrap_or_else(|| Term::atom("true"));
        let antecedents = decompose_antecedent(&antecedent)?;
        Ok(Rule {
            id,
            form,
            antecedent,
            consequent,
            priority,
            antecedents,
        })
    }

    /// Expand a rule form into stored rules: one for `=>`, the forward
    /// and reverse implications for `<=>`. `next_id` mints an id per
    /// produced rule.
    pub fn expand(
        form: &Term,
        mut next_id: impl FnMut() -> SmolStr,
        priority: f64,
    ) -> Result<Vec<Rule>, ValidationError> {
        let op = form
            .operator()
            .ok_or_else(|| ValidationError::BadRuleForm(form.to_string()))?
            .clone();
        if form.len() != 3 {
            return Err(ValidationError::BadRuleForm(form.to_string()));
        }
        match op.as_str() {
            OP_IMPLIES => Ok(vec![Rule::parse(form.clone(), next_id(), priority)?]),
            OP_EQUIV => {
                let left = form.get(1).cloned().expect("arity checked");
                let right = form.get(2).cloned().expect("arity checked");
                let forward = Term::list(vec![
                    Term::atom(OP_IMPLIES),
                    left.clone(),
                    right.clone(),
                ]);
                let reverse = Term::list(vec![Term::atom(OP_IMPLIES), right, left]);
                Ok(vec![
                    Rule::parse(forward, next_id(), priority)?,
                    Rule::parse(reverse, next_id(), priority)?,
                ])
            }
            _ => Err(ValidationError::BadRuleForm(form.to_string())),
        }
    }

    /// Whether a term is a rule form this engine accepts.
    pub fn is_rule_form(term: &Term) -> bool {
        term.operator()
            .is_some_and(|op| matches!(op.as_str(), OP_IMPLIES | OP_EQUIV))
            && term.len() == 3
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.form == other.form
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.form.hash(state);
    }
}

/// Decompose an antecedent into clauses: a single list, a conjunction
/// `(and c1 … cn)` of lists, or the atom `true` (no clauses).
fn decompose_antecedent(antecedent: &Term) -> Result<Vec<RuleClause>, ValidationError> {
    if antecedent.as_atom().is_some_and(|a| a.as_str() == "true") {
        return Ok(Vec::new());
    }
    if antecedent.operator().is_some_and(|op| op.as_str() == OP_AND) {
        let items = antecedent.items().expect("operator implies list");
        return items[1..].iter().map(parse_clause).collect();
    }
    Ok(vec![parse_clause(antecedent)?])
}

fn parse_clause(term: &Term) -> Result<RuleClause, ValidationError> {
    if !term.is_list() {
        return Err(ValidationError::BadClause(term.to_string()));
    }
    if term.operator().is_some_and(|op| op.as_str() == OP_NOT) {
        if term.len() != 2 {
            return Err(ValidationError::BadNegationArity(term.to_string()));
        }
        let inner = term.get(1).expect("arity checked");
        if !inner.is_list() {
            return Err(ValidationError::BadClause(term.to_string()));
        }
        return Ok(RuleClause {
            pattern: inner.clone(),
            negated: true,
        });
    }
    Ok(RuleClause {
        pattern: term.clone(),
        negated: false,
    })
}

/// Parse a quantifier variable spec: a single variable or a list of
/// variables.
pub fn parse_quantified_vars(spec: &Term) -> Result<Vec<Name>, ValidationError> {
    if let Some(name) = spec.as_var() {
        return Ok(vec![name.clone()]);
    }
    let items = spec
        .items()
        .ok_or_else(|| ValidationError::BadQuantifierSpec(spec.to_string()))?;
    let mut vars = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .as_var()
            .ok_or_else(|| ValidationError::BadQuantifierSpec(spec.to_string()))?;
        vars.push(name.clone());
    }
    if vars.is_empty() {
        return Err(ValidationError::BadQuantifierSpec(spec.to_string()));
    }
    Ok(vars)
}

/// The non-reserved predicates a term mentions in operator position, at
/// any depth. Used to index universal assertions.
pub fn referenced_predicates(term: &Term) -> FxHashSet<Name> {
    let mut out = FxHashSet::default();
    for sub in term.subterms() {
        if let Some(op) = sub.operator() {
            if !Term::is_reserved_operator(op.as_str()) {
                out.insert(op.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_one;

    fn t(src: &str) -> Term {
        parse_one(src).unwrap()
    }

    fn ids() -> impl FnMut() -> SmolStr {
        let mut n = 0;
        move || {
            n += 1;
            SmolStr::new(format!("rule_{n}"))
        }
    }

    #[test]
    fn parses_conjunction_antecedent() {
        let rule = Rule::parse(t("(=> (and (p ?x) (q ?x)) (r ?x))"), "r1".into(), 1.0).unwrap();
        assert_eq!(rule.antecedents.len(), 2);
        assert!(!rule.antecedents[0].negated);
        assert_eq!(rule.consequent, t("(r ?x)"));
    }

    #[test]
    fn parses_negated_clause() {
        let rule = Rule::parse(t("(=> (not (p ?x)) (q ?x))"), "r1".into(), 1.0).unwrap();
        assert!(rule.antecedents[0].negated);
        assert_eq!(rule.antecedents[0].pattern, t("(p ?x)"));
        assert_eq!(rule.antecedents[0].as_kif(), t("(not (p ?x))"));
    }

    #[test]
    fn true_antecedent_has_no_clauses() {
        let rule = Rule::parse(t("(=> true (p A))"), "r1".into(), 1.0).unwrap();
        assert!(rule.antecedents.is_empty());
    }

    #[test]
    fn equivalence_expands_to_two_rules() {
        let rules = Rule::expand(&t("(<=> (parent ?x ?y) (child ?y ?x))"), ids(), 1.0).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].consequent, t("(child ?y ?x)"));
        assert_eq!(rules[1].consequent, t("(parent ?x ?y)"));
    }

    #[test]
    fn rejects_bad_forms() {
        assert!(Rule::parse(t("(=> (p ?x))"), "r1".into(), 1.0).is_err());
        assert!(Rule::parse(t("(=> atom (q ?x))"), "r1".into(), 1.0).is_err());
        assert!(Rule::parse(t("(=> (not (p ?x) extra) (q ?x))"), "r1".into(), 1.0).is_err());
    }

    #[test]
    fn rule_identity_is_by_form() {
        let a = Rule::parse(t("(=> (p ?x) (q ?x))"), "r1".into(), 1.0).unwrap();
        let b = Rule::parse(t("(=> (p ?x) (q ?x))"), "r2".into(), 0.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn quantified_var_specs() {
        assert_eq!(parse_quantified_vars(&t("?x")).unwrap().len(), 1);
        assert_eq!(parse_quantified_vars(&t("(?x ?y)")).unwrap().len(), 2);
        assert!(parse_quantified_vars(&t("(?x A)")).is_err());
        assert!(parse_quantified_vars(&t("A")).is_err());
    }

    #[test]
    fn referenced_predicates_skip_reserved() {
        let preds = referenced_predicates(&t("(=> (and (dog ?x) (not (cat ?x))) (mammal ?x))"));
        let mut names: Vec<&str> = preds.iter().map(Name::as_str).collect();
        names.sort();
        assert_eq!(names, ["cat", "dog", "mammal"]);
    }

    #[test]
    fn desirability_ordering() {
        let base = Assertion {
            id: "a".into(),
            kif: t("(p A)"),
            priority: 0.5,
            timestamp: 100,
            source_note_id: None,
            justifications: FxHashSet::default(),
            kind: AssertionKind::Ground,
            negated: false,
            equality: false,
            oriented_equality: false,
            quantified_vars: Box::new([]),
            derivation_depth: 1,
            active: true,
            kb_id: "global".into(),
        };
        let inactive = Assertion {
            active: false,
            ..base.clone()
        };
        let higher_pri = Assertion {
            priority: 0.9,
            ..base.clone()
        };
        let shallower = Assertion {
            derivation_depth: 0,
            ..base.clone()
        };
        assert_eq!(base.cmp_desirability(&inactive), Ordering::Less);
        assert_eq!(higher_pri.cmp_desirability(&base), Ordering::Less);
        assert_eq!(shallower.cmp_desirability(&base), Ordering::Less);
    }
}
