//! Knowledge representation: assertions, rules, stores, truth maintenance.

mod assertion;
mod context;
mod skolem;
mod store;
mod tms;

pub use assertion::{
    Assertion, AssertionId, AssertionKind, KbId, NoteId, PotentialAssertion, Rule, RuleClause,
    ValidationError, parse_quantified_vars, referenced_predicates,
};
pub use context::ReasonerContext;
pub use skolem::Skolemizer;
pub use store::KnowledgeBase;
pub use tms::{ContradictionPolicy, LogOnlyPolicy, Tms};

/// Id of the global knowledge base; note KBs use their note id.
pub const GLOBAL_KB: &str = "global";
