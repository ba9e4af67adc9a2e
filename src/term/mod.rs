//! KIF term model: atoms, variables and lists.
//!
//! Terms are immutable and hash-consed at the leaves: every atom and
//! variable has a single canonical instance per value, and every term
//! caches its weight, variable set, Skolem flag and structural hash at
//! construction. Cloning a [`Term`] is an `Arc` increment.

mod lexer;
mod parser;
mod unify;

pub use parser::{ParseError, parse_all, parse_one};
pub use unify::{Bindings, match_terms, rewrite, substitute, substitute_fully, unify};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

use crate::base::Name;

/// Implication operator.
pub const OP_IMPLIES: &str = "=>";
/// Equivalence operator, stored as two implications.
pub const OP_EQUIV: &str = "<=>";
pub const OP_AND: &str = "and";
pub const OP_OR: &str = "or";
pub const OP_NOT: &str = "not";
pub const OP_EQUAL: &str = "=";
pub const OP_EXISTS: &str = "exists";
pub const OP_FORALL: &str = "forall";

/// Operators with reserved meaning to the engine.
pub const RESERVED_OPERATORS: [&str; 8] = [
    OP_IMPLIES, OP_EQUIV, OP_AND, OP_OR, OP_NOT, OP_EQUAL, OP_EXISTS, OP_FORALL,
];

/// Predicates for which `(p x x)` carries no information.
pub const REFLEXIVE_PREDICATES: [&str; 8] = [
    "instance",
    "subclass",
    "subrelation",
    "equivalent",
    "same",
    "equal",
    "domain",
    "range",
];

const SKOLEM_CONSTANT_PREFIX: &str = "skc_";
const SKOLEM_FUNCTION_PREFIX: &str = "skf_";

/// The three shapes a term can take.
#[derive(Debug, Clone)]
pub enum TermKind {
    /// A ground symbol or quoted string.
    Atom(Name),
    /// A variable; the name keeps the leading `?`.
    Var(Name),
    /// A sequence of terms, insertion order significant.
    List(Box<[Term]>),
}

#[derive(Debug)]
struct TermData {
    kind: TermKind,
    weight: u32,
    vars: Box<[Name]>,
    skolem: bool,
    hash: u64,
    text: OnceCell<String>,
}

/// An immutable KIF term.
#[derive(Clone)]
pub struct Term {
    data: Arc<TermData>,
}

static ATOMS: Lazy<Mutex<FxHashMap<Name, Term>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));
static VARS: Lazy<Mutex<FxHashMap<Name, Term>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

fn leaf_hash(tag: u8, name: &Name) -> u64 {
    let mut hasher = FxHasher::default();
    tag.hash(&mut hasher);
    name.as_str().hash(&mut hasher);
    hasher.finish()
}

impl Term {
    /// The canonical atom for `text`.
    pub fn atom(text: &str) -> Term {
        let name = Name::new(text);
        let mut atoms = ATOMS.lock();
        if let Some(existing) = atoms.get(&name) {
            return existing.clone();
        }
        let skolem = name.starts_with(SKOLEM_CONSTANT_PREFIX);
        let term = Term {
            data: Arc::new(TermData {
                hash: leaf_hash(0, &name),
                kind: TermKind::Atom(name.clone()),
                weight: 1,
                vars: Box::new([]),
                skolem,
                text: OnceCell::new(),
            }),
        };
        atoms.insert(name, term.clone());
        term
    }

    /// The canonical variable named `name` (including the leading `?`).
    pub fn var(name: &str) -> Term {
        debug_assert!(name.starts_with('?') && name.len() >= 2, "bad variable {name:?}");
        let name = Name::new(name);
        let mut vars = VARS.lock();
        if let Some(existing) = vars.get(&name) {
            return existing.clone();
        }
        let term = Term {
            data: Arc::new(TermData {
                hash: leaf_hash(1, &name),
                kind: TermKind::Var(name.clone()),
                weight: 1,
                vars: Box::new([name.clone()]),
                skolem: false,
                text: OnceCell::new(),
            }),
        };
        vars.insert(name, term.clone());
        term
    }

    /// A list of the given terms.
    pub fn list(items: Vec<Term>) -> Term {
        let items: Box<[Term]> = items.into();
        let weight = 1 + items.iter().map(Term::weight).sum::<u32>();

        let mut vars: Vec<Name> = Vec::new();
        for item in &items {
            for v in item.vars() {
                if !vars.contains(v) {
                    vars.push(v.clone());
                }
            }
        }
        vars.sort();

        let operator_skolem = items
            .first()
            .and_then(Term::as_atom)
            .is_some_and(|op| op.starts_with(SKOLEM_FUNCTION_PREFIX));
        let skolem = operator_skolem || items.iter().any(Term::contains_skolem);

        let mut hasher = FxHasher::default();
        2u8.hash(&mut hasher);
        for item in &items {
            item.data.hash.hash(&mut hasher);
        }

        Term {
            data: Arc::new(TermData {
                hash: hasher.finish(),
                kind: TermKind::List(items),
                weight,
                vars: vars.into(),
                skolem,
                text: OnceCell::new(),
            }),
        }
    }

    pub fn kind(&self) -> &TermKind {
        &self.data.kind
    }

    /// Cached weight: 1 for leaves, 1 + sum of element weights for lists.
    pub fn weight(&self) -> u32 {
        self.data.weight
    }

    /// Cached, sorted, deduplicated variable names occurring in this term.
    pub fn vars(&self) -> &[Name] {
        &self.data.vars
    }

    pub fn contains_variable(&self) -> bool {
        !self.data.vars.is_empty()
    }

    /// Whether this term mentions a Skolem constant (`skc_…`) or a list
    /// with a Skolem function operator (`skf_…`), at any depth.
    pub fn contains_skolem(&self) -> bool {
        self.data.skolem
    }

    pub fn is_atom(&self) -> bool {
        matches!(self.data.kind, TermKind::Atom(_))
    }

    pub fn is_var(&self) -> bool {
        matches!(self.data.kind, TermKind::Var(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.data.kind, TermKind::List(_))
    }

    pub fn as_atom(&self) -> Option<&Name> {
        match &self.data.kind {
            TermKind::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Name> {
        match &self.data.kind {
            TermKind::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Term]> {
        match &self.data.kind {
            TermKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// The operator of a list whose first element is an atom.
    pub fn operator(&self) -> Option<&Name> {
        self.items()?.first()?.as_atom()
    }

    /// Element `i` of a list.
    pub fn get(&self, i: usize) -> Option<&Term> {
        self.items()?.get(i)
    }

    /// Number of elements for a list, 0 otherwise.
    pub fn len(&self) -> usize {
        self.items().map_or(0, <[Term]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric value of an atom, if it parses as one.
    pub fn as_number(&self) -> Option<f64> {
        self.as_atom()?.parse().ok()
    }

    /// `(op x x)` for a reflexive predicate or `=`, or `(not T)` with a
    /// trivial body, carries no information and is never committed.
    pub fn is_trivial(&self) -> bool {
        let Some(items) = self.items() else {
            return false;
        };
        let Some(op) = items.first().and_then(Term::as_atom) else {
            return false;
        };
        if op.as_str() == OP_NOT && items.len() == 2 {
            return items[1].is_trivial();
        }
        if items.len() == 3
            && (op.as_str() == OP_EQUAL || REFLEXIVE_PREDICATES.contains(&op.as_str()))
        {
            return items[1] == items[2];
        }
        false
    }

    /// Whether `name` is one of the operators the engine reserves.
    pub fn is_reserved_operator(name: &str) -> bool {
        RESERVED_OPERATORS.contains(&name)
    }

    /// Walk this term and every subterm, depth-first, self first.
    pub fn subterms(&self) -> SubtermIter<'_> {
        SubtermIter { stack: vec![self] }
    }

    /// Cached display form.
    pub fn text(&self) -> &str {
        self.data.text.get_or_init(|| print_term(self))
    }
}

/// Depth-first iterator over a term and all of its subterms.
pub struct SubtermIter<'a> {
    stack: Vec<&'a Term>,
}

impl<'a> Iterator for SubtermIter<'a> {
    type Item = &'a Term;

    fn next(&mut self) -> Option<&'a Term> {
        let term = self.stack.pop()?;
        if let Some(items) = term.items() {
            self.stack.extend(items.iter().rev());
        }
        Some(term)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.data, &other.data) {
            return true;
        }
        if self.data.hash != other.data.hash {
            return false;
        }
        match (&self.data.kind, &other.data.kind) {
            (TermKind::Atom(a), TermKind::Atom(b)) => a == b,
            (TermKind::Var(a), TermKind::Var(b)) => a == b,
            (TermKind::List(a), TermKind::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.data.hash);
    }
}

fn needs_quoting(text: &str) -> bool {
    text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '?'))
}

fn print_atom(out: &mut String, text: &str) {
    if !needs_quoting(text) {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}

fn print_term(term: &Term) -> String {
    let mut out = String::new();
    print_into(&mut out, term);
    out
}

fn print_into(out: &mut String, term: &Term) {
    match term.kind() {
        TermKind::Atom(name) => print_atom(out, name),
        TermKind::Var(name) => out.push_str(name),
        TermKind::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                print_into(out, item);
            }
            out.push(')');
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(items: Vec<Term>) -> Term {
        Term::list(items)
    }

    #[test]
    fn atoms_are_canonical() {
        let a = Term::atom("dog");
        let b = Term::atom("dog");
        assert!(Arc::ptr_eq(&a.data, &b.data));
    }

    #[test]
    fn weight_counts_nodes() {
        assert_eq!(Term::atom("a").weight(), 1);
        let t = l(vec![Term::atom("p"), Term::atom("a"), Term::var("?x")]);
        assert_eq!(t.weight(), 4);
    }

    #[test]
    fn variable_set_is_sorted_and_deduped() {
        let t = l(vec![
            Term::atom("p"),
            Term::var("?y"),
            Term::var("?x"),
            Term::var("?y"),
        ]);
        let names: Vec<&str> = t.vars().iter().map(Name::as_str).collect();
        assert_eq!(names, ["?x", "?y"]);
    }

    #[test]
    fn skolem_detection() {
        assert!(Term::atom("skc_k_7").contains_skolem());
        assert!(!Term::atom("kitten").contains_skolem());
        let f = l(vec![Term::atom("skf_k_3"), Term::atom("Alice")]);
        assert!(f.contains_skolem());
        let wrapped = l(vec![Term::atom("owner"), f, Term::atom("Alice")]);
        assert!(wrapped.contains_skolem());
        let plain = l(vec![Term::atom("owner"), Term::atom("Rex")]);
        assert!(!plain.contains_skolem());
    }

    #[test]
    fn trivial_lists() {
        let same = l(vec![Term::atom("instance"), Term::atom("A"), Term::atom("A")]);
        assert!(same.is_trivial());
        let eq = l(vec![Term::atom("="), Term::atom("A"), Term::atom("A")]);
        assert!(eq.is_trivial());
        let negated = l(vec![Term::atom("not"), same.clone()]);
        assert!(negated.is_trivial());
        let differ = l(vec![Term::atom("instance"), Term::atom("A"), Term::atom("B")]);
        assert!(!differ.is_trivial());
        let other_pred = l(vec![Term::atom("likes"), Term::atom("A"), Term::atom("A")]);
        assert!(!other_pred.is_trivial());
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(Term::atom("plain").to_string(), "plain");
        assert_eq!(Term::atom("two words").to_string(), "\"two words\"");
        assert_eq!(Term::atom("").to_string(), "\"\"");
        assert_eq!(Term::atom("a;b").to_string(), "\"a;b\"");
        assert_eq!(Term::atom("say \"hi\"").to_string(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn subterms_walks_everything() {
        let inner = l(vec![Term::atom("f"), Term::atom("A")]);
        let t = l(vec![Term::atom("g"), inner.clone()]);
        let subs: Vec<String> = t.subterms().map(|s| s.to_string()).collect();
        assert_eq!(subs, ["(g (f A))", "g", "(f A)", "f", "A"]);
    }
}
