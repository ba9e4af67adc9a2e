//! Pluggable operators evaluated during backward chaining.
//!
//! An operator is a named predicate the prover can compute instead of
//! searching for. It receives the goal's argument list and returns a
//! term; the prover succeeds directly on the atom `true`, otherwise it
//! unifies the goal with the returned term.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::base::Name;
use crate::term::{OP_EQUAL, Term};

/// A computable predicate.
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    /// Evaluate the operator over the goal's arguments. `None` means the
    /// operator does not apply (treated as a failed branch).
    fn apply(&self, args: &[Term], registry: &OperatorRegistry) -> Option<Term>;
}

/// Named operators keyed by their predicate atom.
#[derive(Default)]
pub struct OperatorRegistry {
    operators: RwLock<FxHashMap<Name, Arc<dyn Operator>>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the baseline arithmetic and comparison operators
    /// plus computed equality.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for op in ["+", "-", "*", "/"] {
            registry.register(Arc::new(ArithmeticOperator { symbol: op }));
        }
        for op in ["<", ">", "<=", ">="] {
            registry.register(Arc::new(ComparisonOperator { symbol: op }));
        }
        registry.register(Arc::new(EqualityOperator));
        registry
    }

    pub fn register(&self, operator: Arc<dyn Operator>) {
        self.operators
            .write()
            .insert(Name::new(operator.name()), operator);
    }

    pub fn get(&self, name: &Name) -> Option<Arc<dyn Operator>> {
        self.operators.read().get(name).cloned()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.operators.read().contains_key(name)
    }

    /// Evaluate a term bottom-up through registered operators: a list
    /// whose head names an operator is replaced by the operator's result
    /// when it produces one; anything else is returned unchanged.
    pub fn evaluate(&self, term: &Term) -> Term {
        let Some(operator) = term.operator().and_then(|op| self.get(op)) else {
            return term.clone();
        };
        let args: Vec<Term> = term
            .items()
            .map(|items| items[1..].iter().map(|arg| self.evaluate(arg)).collect())
            .unwrap_or_default();
        operator.apply(&args, self).unwrap_or_else(|| term.clone())
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .operators
            .read()
            .keys()
            .map(|n| n.as_str().to_owned())
            .collect();
        f.debug_struct("OperatorRegistry")
            .field("operators", &names)
            .finish()
    }
}

/// Format a float as a KIF numeric atom, dropping a trailing `.0`.
fn number_atom(value: f64) -> Term {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        Term::atom(&format!("{}", value as i64))
    } else {
        Term::atom(&format!("{value}"))
    }
}

fn bool_atom(value: bool) -> Term {
    Term::atom(if value { "true" } else { "false" })
}

/// `+ - * /` over numeric atoms. Folds left over two or more arguments.
struct ArithmeticOperator {
    symbol: &'static str,
}

impl Operator for ArithmeticOperator {
    fn name(&self) -> &str {
        self.symbol
    }

    fn apply(&self, args: &[Term], registry: &OperatorRegistry) -> Option<Term> {
        let mut numbers = args.iter().map(|arg| registry.evaluate(arg).as_number());
        let mut acc = numbers.next()??;
        let mut any = false;
        for n in numbers {
            let n = n?;
            any = true;
            acc = match self.symbol {
                "+" => acc + n,
                "-" => acc - n,
                "*" => acc * n,
                "/" => {
                    if n == 0.0 {
                        return None;
                    }
                    acc / n
                }
                _ => return None,
            };
        }
        if !any {
            return None;
        }
        Some(number_atom(acc))
    }
}

/// `< > <= >=` over numeric atoms, returning `true`/`false`.
struct ComparisonOperator {
    symbol: &'static str,
}

impl Operator for ComparisonOperator {
    fn name(&self) -> &str {
        self.symbol
    }

    fn apply(&self, args: &[Term], registry: &OperatorRegistry) -> Option<Term> {
        let [a, b] = args else {
            return None;
        };
        let (a, b) = (
            registry.evaluate(a).as_number()?,
            registry.evaluate(b).as_number()?,
        );
        let result = match self.symbol {
            "<" => a < b,
            ">" => a > b,
            "<=" => a <= b,
            ">=" => a >= b,
            _ => return None,
        };
        Some(bool_atom(result))
    }
}

/// Computed equality: evaluates both sides, then answers `true`/`false`
/// for ground sides or hands back a form the prover can unify the goal
/// against, binding a variable side to the evaluated other side.
struct EqualityOperator;

impl Operator for EqualityOperator {
    fn name(&self) -> &str {
        OP_EQUAL
    }

    fn apply(&self, args: &[Term], registry: &OperatorRegistry) -> Option<Term> {
        let [left, right] = args else {
            return None;
        };
        let eval_left = registry.evaluate(left);
        let eval_right = registry.evaluate(right);
        if !eval_left.contains_variable() && !eval_right.contains_variable() {
            return Some(bool_atom(eval_left == eval_right));
        }
        // Keep the unevaluated side verbatim so the goal still unifies
        // with it; the evaluated side carries the computed value.
        if left.is_var() {
            return Some(Term::list(vec![
                Term::atom(OP_EQUAL),
                eval_right,
                right.clone(),
            ]));
        }
        if right.is_var() {
            return Some(Term::list(vec![
                Term::atom(OP_EQUAL),
                left.clone(),
                eval_left,
            ]));
        }
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
    fn arithmetic_evaluates() {
        let registry = OperatorRegistry::with_builtins();
        assert_eq!(registry.evaluate(&t("(+ 2 3)")), Term::atom("5"));
        assert_eq!(registry.evaluate(&t("(* 2 (+ 1 3))")), Term::atom("8"));
        assert_eq!(registry.evaluate(&t("(/ 7 2)")), Term::atom("3.5"));
    }

    #[test]
    fn division_by_zero_does_not_apply() {
        let registry = OperatorRegistry::with_builtins();
        // Evaluation falls back to the unevaluated term.
        assert_eq!(registry.evaluate(&t("(/ 1 0)")), t("(/ 1 0)"));
    }

    #[test]
    fn comparisons_return_booleans() {
        let registry = OperatorRegistry::with_builtins();
        assert_eq!(registry.evaluate(&t("(< 1 2)")), Term::atom("true"));
        assert_eq!(registry.evaluate(&t("(>= 1 2)")), Term::atom("false"));
        assert_eq!(registry.evaluate(&t("(< (+ 1 1) 3)")), Term::atom("true"));
    }

    #[test]
    fn non_numeric_arguments_do_not_apply() {
        let registry = OperatorRegistry::with_builtins();
        assert_eq!(registry.evaluate(&t("(+ a b)")), t("(+ a b)"));
    }

    #[test]
    fn equality_with_variable_side_exposes_computed_value() {
        let registry = OperatorRegistry::with_builtins();
        let equality = registry.get(&Name::new("=")).unwrap();
        let result = equality
            .apply(&[Term::var("?y"), t("(+ 2 3)")], &registry)
            .unwrap();
        assert_eq!(result, t("(= 5 (+ 2 3))"));
    }

    #[test]
    fn ground_equality_answers_directly() {
        let registry = OperatorRegistry::with_builtins();
        let equality = registry.get(&Name::new("=")).unwrap();
        assert_eq!(
            equality.apply(&[t("(+ 2 2)"), Term::atom("4")], &registry),
            Some(Term::atom("true"))
        );
        assert_eq!(
            equality.apply(&[Term::atom("3"), Term::atom("4")], &registry),
            Some(Term::atom("false"))
        );
    }
}
