//! Unification, one-way matching, substitution and rewriting.
//!
//! All recursive operations share a depth cap; hitting it makes the
//! operation fail (`None`), which callers treat as "no match". That is a
//! safe over-approximation: the engine may miss a derivation but never
//! produces a wrong one.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::base::Name;

use super::{Term, TermKind};

/// Recursion cap shared by unify/match/substitute.
const MAX_DEPTH: u32 = 50;

/// A variable-name → term substitution.
#[derive(Clone, Default, PartialEq)]
pub struct Bindings {
    map: FxHashMap<Name, Term>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Name) -> Option<&Term> {
        self.map.get(name)
    }

    pub fn insert(&mut self, name: Name, term: Term) {
        self.map.insert(name, term);
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Term)> {
        self.map.iter()
    }

    /// The set of bound variable names.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.map.keys()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&Name, &Term)> = self.map.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        let mut set = f.debug_map();
        for (name, term) in entries {
            set.entry(&name.as_str(), &term.text());
        }
        set.finish()
    }
}

impl fmt::Display for Bindings {
    /// `{?v=term,…}` with names in sorted order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&Name, &Term)> = self.map.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        write!(f, "{{")?;
        for (i, (name, term)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}={term}")?;
        }
        write!(f, "}}")
    }
}

/// Chase the binding chain at the root of `term`, without descending
/// into lists. Gives up (returns the last term reached) at the cap.
fn resolve_root<'a>(term: &'a Term, bindings: &'a Bindings) -> &'a Term {
    let mut current = term;
    for _ in 0..MAX_DEPTH {
        match current.kind() {
            TermKind::Var(name) => match bindings.get(name) {
                Some(next) if next != current => current = next,
                _ => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Most general unifier of `a` and `b` extending `bindings`, or `None`.
pub fn unify(a: &Term, b: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    if unify_rec(a, b, &mut out, 0) {
        Some(out)
    } else {
        None
    }
}

fn unify_rec(a: &Term, b: &Term, bindings: &mut Bindings, depth: u32) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let a = resolve_root(a, bindings).clone();
    let b = resolve_root(b, bindings).clone();
    match (a.kind(), b.kind()) {
        (TermKind::Var(va), TermKind::Var(vb)) if va == vb => true,
        (TermKind::Var(va), _) => bind(va.clone(), &b, bindings, depth),
        (_, TermKind::Var(vb)) => bind(vb.clone(), &a, bindings, depth),
        (TermKind::Atom(x), TermKind::Atom(y)) => x == y,
        (TermKind::List(xs), TermKind::List(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| unify_rec(x, y, bindings, depth + 1))
        }
        _ => false,
    }
}

/// Bind `var` to `value` after fully substituting current bindings into
/// it; fails the occurs check if the substituted value still mentions
/// `var`.
fn bind(var: Name, value: &Term, bindings: &mut Bindings, depth: u32) -> bool {
    let Some(full) = subst_full_rec(value, bindings, depth) else {
        return false;
    };
    if let TermKind::Var(v) = full.kind() {
        if *v == var {
            return true;
        }
    }
    if full.vars().contains(&var) {
        return false;
    }
    bindings.insert(var, full);
    true
}

/// One-way matching: like [`unify`] but only variables in `pattern` may
/// bind, and no occurs check is needed.
pub fn match_terms(pattern: &Term, term: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    if match_rec(pattern, term, &mut out, 0) {
        Some(out)
    } else {
        None
    }
}

fn match_rec(pattern: &Term, term: &Term, bindings: &mut Bindings, depth: u32) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    match pattern.kind() {
        TermKind::Var(name) => match bindings.get(name) {
            Some(bound) => {
                let bound = bound.clone();
                match_rec(&bound, term, bindings, depth + 1)
            }
            None => {
                bindings.insert(name.clone(), term.clone());
                true
            }
        },
        TermKind::Atom(a) => term.as_atom().is_some_and(|b| a == b),
        TermKind::List(ps) => match term.kind() {
            TermKind::List(ts) => {
                ps.len() == ts.len()
                    && ps
                        .iter()
                        .zip(ts.iter())
                        .all(|(p, t)| match_rec(p, t, bindings, depth + 1))
            }
            _ => false,
        },
    }
}

/// Shallow substitution: each variable is looked up once, without
/// chasing chains of bindings.
pub fn substitute(term: &Term, bindings: &Bindings) -> Term {
    if bindings.is_empty() || !term.contains_variable() {
        return term.clone();
    }
    match term.kind() {
        TermKind::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| term.clone()),
        TermKind::Atom(_) => term.clone(),
        TermKind::List(items) => {
            Term::list(items.iter().map(|t| substitute(t, bindings)).collect())
        }
    }
}

/// Full substitution: chase bindings until terms stop changing, bounded
/// by the depth cap. `None` means the cap was hit (cyclic bindings).
pub fn substitute_fully(term: &Term, bindings: &Bindings) -> Option<Term> {
    subst_full_rec(term, bindings, 0)
}

fn subst_full_rec(term: &Term, bindings: &Bindings, depth: u32) -> Option<Term> {
    if depth > MAX_DEPTH {
        return None;
    }
    if bindings.is_empty() || !term.contains_variable() {
        return Some(term.clone());
    }
    match term.kind() {
        TermKind::Var(name) => match bindings.get(name) {
            Some(bound) if bound != term => subst_full_rec(&bound.clone(), bindings, depth + 1),
            _ => Some(term.clone()),
        },
        TermKind::Atom(_) => Some(term.clone()),
        TermKind::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(subst_full_rec(item, bindings, depth + 1)?);
            }
            Some(Term::list(out))
        }
    }
}

/// Rewrite `target` with the oriented equality `lhs → rhs`.
///
/// Tries to match `lhs` against `target` itself; on success substitutes
/// the bindings into `rhs`. Otherwise recurses into list elements.
/// Returns `Some` iff at least one rewrite occurred.
pub fn rewrite(target: &Term, lhs: &Term, rhs: &Term) -> Option<Term> {
    if let Some(bindings) = match_terms(lhs, target, &Bindings::new()) {
        return substitute_fully(rhs, &bindings);
    }
    let items = target.items()?;
    let mut changed = false;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match rewrite(item, lhs, rhs) {
            Some(new_item) => {
                changed = true;
                out.push(new_item);
            }
            None => out.push(item.clone()),
        }
    }
    if changed {
        Some(Term::list(out))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_one;

    fn t(src: &str) -> Term {
        parse_one(src).unwrap()
    }

    #[test]
    fn identical_terms_unify_with_empty_bindings() {
        let x = t("(p A (q B))");
        let mgu = unify(&x, &x, &Bindings::new()).unwrap();
        assert!(mgu.is_empty());
    }

    #[test]
    fn unify_is_symmetric() {
        let a = t("(p ?x B)");
        let b = t("(p A ?y)");
        let left = unify(&a, &b, &Bindings::new()).unwrap();
        let right = unify(&b, &a, &Bindings::new()).unwrap();
        assert_eq!(
            substitute_fully(&a, &left).unwrap(),
            substitute_fully(&b, &right).unwrap()
        );
    }

    #[test]
    fn unifier_makes_sides_equal() {
        let a = t("(p ?x (f ?y))");
        let b = t("(p A (f B))");
        let mgu = unify(&a, &b, &Bindings::new()).unwrap();
        assert_eq!(
            substitute_fully(&a, &mgu).unwrap(),
            substitute_fully(&b, &mgu).unwrap()
        );
    }

    #[test]
    fn occurs_check_fails() {
        let a = t("?x");
        let b = t("(f ?x)");
        assert!(unify(&a, &b, &Bindings::new()).is_none());
    }

    #[test]
    fn bound_variables_are_resolved_before_comparison() {
        let mut b0 = Bindings::new();
        b0.insert(Name::new("?x"), Term::atom("A"));
        assert!(unify(&t("(p ?x)"), &t("(p A)"), &b0).is_some());
        assert!(unify(&t("(p ?x)"), &t("(p B)"), &b0).is_none());
    }

    #[test]
    fn match_only_binds_pattern_variables() {
        let pattern = t("(p ?x)");
        let term = t("(p ?y)");
        let b = match_terms(&pattern, &term, &Bindings::new()).unwrap();
        assert_eq!(b.get(&Name::new("?x")), Some(&Term::var("?y")));
        // The reverse direction must not bind ?y through the term side.
        assert!(match_terms(&t("(p A)"), &t("(p ?y)"), &Bindings::new()).is_none());
    }

    #[test]
    fn match_is_a_restriction_of_unify() {
        let pattern = t("(p ?x B)");
        let term = t("(p A B)");
        let matched = match_terms(&pattern, &term, &Bindings::new()).unwrap();
        let unified = unify(&pattern, &term, &Bindings::new()).unwrap();
        assert_eq!(matched, unified);
    }

    #[test]
    fn shallow_vs_full_substitution() {
        let mut b = Bindings::new();
        b.insert(Name::new("?x"), Term::var("?y"));
        b.insert(Name::new("?y"), Term::atom("A"));
        let term = t("(p ?x)");
        assert_eq!(substitute(&term, &b), t("(p ?y)"));
        assert_eq!(substitute_fully(&term, &b).unwrap(), t("(p A)"));
    }

    #[test]
    fn rewrite_at_root_and_inside() {
        let lhs = t("(f ?x)");
        let rhs = t("?x");
        assert_eq!(rewrite(&t("(f A)"), &lhs, &rhs).unwrap(), t("A"));
        assert_eq!(rewrite(&t("(g (f A))"), &lhs, &rhs).unwrap(), t("(g A)"));
        assert!(rewrite(&t("(g B)"), &lhs, &rhs).is_none());
    }

    #[test]
    fn rewrite_handles_multiple_sites() {
        let lhs = t("(f ?x)");
        let rhs = t("?x");
        assert_eq!(
            rewrite(&t("(g (f A) (f B))"), &lhs, &rhs).unwrap(),
            t("(g A B)")
        );
    }
}
