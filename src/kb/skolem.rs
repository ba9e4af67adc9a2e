//! Existential elimination.
//!
//! `(exists ?k body)` and `(exists (?k1 ?k2) body)` are rewritten by
//! replacing each existential variable with a fresh Skolem constant
//! `skc_<name>_<n>`, or, when the body has enclosing free variables, a
//! Skolem function `(skf_<name>_<n> arg…)` over those variables.

use std::sync::Arc;

use crate::base::{IdGen, Name};
use crate::term::{Bindings, Term, substitute_fully};

use super::assertion::{ValidationError, parse_quantified_vars};

#[derive(Debug, Clone)]
pub struct Skolemizer {
    ids: Arc<IdGen>,
}

impl Skolemizer {
    pub fn new(ids: Arc<IdGen>) -> Self {
        Self { ids }
    }

    /// Eliminate the existentials of `(exists vars_spec body)` given the
    /// bindings of the enclosing derivation, returning the rewritten
    /// body.
    pub fn skolemize(
        &self,
        vars_spec: &Term,
        body: &Term,
        outer: &Bindings,
    ) -> Result<Term, ValidationError> {
        let existentials = parse_quantified_vars(vars_spec)?;
        if !body.is_list() {
            return Err(ValidationError::BadQuantifiedForm {
                kind: "exists",
                form: body.to_string(),
            });
        }

        // Free variables of the body, minus the existentials, with the
        // outer bindings substituted in; sorted by string form so the
        // argument list is deterministic.
        let mut args: Vec<Term> = Vec::new();
        for free in body.vars() {
            if existentials.contains(free) {
                continue;
            }
            let var = Term::var(free.as_str());
            let resolved = substitute_fully(&var, outer).unwrap_or(var);
            if !args.contains(&resolved) {
                args.push(resolved);
            }
        }
        args.sort_by(|a, b| a.text().cmp(b.text()));

        let mut result = body.clone();
        for existential in &existentials {
            let skolem = self.fresh_skolem_term(existential, &args);
            let mut bindings = Bindings::new();
            bindings.insert(existential.clone(), skolem);
            result = substitute_fully(&result, &bindings).unwrap_or(result);
        }
        Ok(result)
    }

    fn fresh_skolem_term(&self, var: &Name, args: &[Term]) -> Term {
        let base = var.trim_start_matches('?');
        let n = self.ids.next_raw();
        if args.is_empty() {
            Term::atom(&format!("skc_{base}_{n}"))
        } else {
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Term::atom(&format!("skf_{base}_{n}")));
            items.extend(args.iter().cloned());
            Term::list(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_one;

    fn t(src: &str) -> Term {
        parse_one(src).unwrap()
    }

    fn skolemizer() -> Skolemizer {
        Skolemizer::new(Arc::new(IdGen::new()))
    }

    #[test]
    fn closed_existential_gets_constant() {
        let sk = skolemizer();
        let out = sk
            .skolemize(&t("?k"), &t("(instance ?k Kitten)"), &Bindings::new())
            .unwrap();
        let arg = out.get(1).unwrap();
        assert!(arg.as_atom().unwrap().starts_with("skc_k_"));
        assert!(out.contains_skolem());
    }

    #[test]
    fn open_existential_gets_function_of_free_vars() {
        let sk = skolemizer();
        let out = sk
            .skolemize(&t("?k"), &t("(owner ?k ?who)"), &Bindings::new())
            .unwrap();
        let skolem = out.get(1).unwrap();
        assert!(skolem.operator().unwrap().starts_with("skf_k_"));
        assert_eq!(skolem.get(1).unwrap(), &Term::var("?who"));
    }

    #[test]
    fn outer_bindings_are_substituted_into_arguments() {
        let sk = skolemizer();
        let mut outer = Bindings::new();
        outer.insert(Name::new("?who"), Term::atom("Alice"));
        let out = sk
            .skolemize(&t("?k"), &t("(owner ?k ?who)"), &outer)
            .unwrap();
        let skolem = out.get(1).unwrap();
        assert_eq!(skolem.get(1).unwrap(), &Term::atom("Alice"));
    }

    #[test]
    fn shared_existential_uses_one_fresh_term() {
        let sk = skolemizer();
        let out = sk
            .skolemize(
                &t("(?k)"),
                &t("(and (instance ?k Kitten) (owner ?k Alice))"),
                &Bindings::new(),
            )
            .unwrap();
        let first = out.get(1).unwrap().get(1).unwrap();
        let second = out.get(2).unwrap().get(1).unwrap();
        assert_eq!(first, second);
        assert!(first.as_atom().unwrap().starts_with("skc_k_"));
    }

    #[test]
    fn multiple_existentials_get_distinct_terms() {
        let sk = skolemizer();
        let out = sk
            .skolemize(&t("(?a ?b)"), &t("(pair ?a ?b)"), &Bindings::new())
            .unwrap();
        assert_ne!(out.get(1).unwrap(), out.get(2).unwrap());
    }
}
