#![allow(clippy::unwrap_used)]
//! Backward chaining and operator evaluation through the query API.

use std::time::Duration;

use rstest::rstest;

use noema::{Config, Engine, QueryKind, QueryStatus, Term, parse_one};

const SETTLE: Duration = Duration::from_secs(5);
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

fn engine() -> Engine {
    Engine::new(Config::default().with_worker_threads(2)).unwrap()
}

fn submit(engine: &Engine, src: &str) {
    engine.submit_term(parse_one(src).unwrap(), "test", None);
    assert!(engine.settle(SETTLE), "engine did not settle");
}

fn ask(engine: &Engine, src: &str) -> noema::QueryAnswer {
    engine.query(
        QueryKind::AskBindings,
        parse_one(src).unwrap(),
        None,
        QUERY_TIMEOUT,
    )
}

#[test]
fn ground_goal_succeeds_against_a_fact() {
    let engine = engine();
    submit(&engine, "(foo A)");
    let answer = ask(&engine, "(foo A)");
    assert_eq!(answer.status, QueryStatus::Success);
}

#[test]
fn variable_goal_returns_bindings() {
    let engine = engine();
    submit(&engine, "(foo A)");
    let answer = ask(&engine, "(foo ?x)");
    assert_eq!(answer.status, QueryStatus::Success);
    assert_eq!(answer.bindings.len(), 1);
    let value = answer.bindings[0].get(&noema::Name::new("?x")).unwrap();
    assert_eq!(value, &Term::atom("A"));
}

#[test]
fn unprovable_goal_fails() {
    let engine = engine();
    submit(&engine, "(foo A)");
    let answer = ask(&engine, "(foo B)");
    assert_eq!(answer.status, QueryStatus::Failure);
    assert!(answer.bindings.is_empty());
}

#[test]
fn goals_prove_through_rules() {
    let engine = engine();
    submit(&engine, "(=> (and (p ?x) (q ?x)) (r ?x))");
    submit(&engine, "(p A)");
    submit(&engine, "(q A)");
    submit(&engine, "(q B)");

    let answer = ask(&engine, "(r ?who)");
    assert_eq!(answer.status, QueryStatus::Success);
    let values: Vec<String> = answer
        .bindings
        .iter()
        .filter_map(|b| b.get(&noema::Name::new("?who")))
        .map(|t| t.to_string())
        .collect();
    assert!(values.contains(&"A".to_string()));
    assert!(!values.contains(&"B".to_string()));
}

#[test]
fn recursive_rules_terminate_within_depth_budget() {
    let engine = engine();
    submit(&engine, "(=> (above ?x ?y) (above ?y ?x))");
    submit(&engine, "(above Roof Floor)");
    let answer = ask(&engine, "(above Floor Roof)");
    assert_eq!(answer.status, QueryStatus::Success);
}

#[test]
fn arithmetic_binds_through_computed_equality() {
    let engine = engine();
    let answer = ask(&engine, "(= ?y (+ 2 3))");
    assert_eq!(answer.status, QueryStatus::Success);
    assert_eq!(answer.bindings.len(), 1);
    let value = answer.bindings[0].get(&noema::Name::new("?y")).unwrap();
    assert_eq!(value, &Term::atom("5"));
}

#[rstest]
#[case("(< 1 2)", QueryStatus::Success)]
#[case("(> 1 2)", QueryStatus::Failure)]
#[case("(<= 2 2)", QueryStatus::Success)]
#[case("(>= 1 2)", QueryStatus::Failure)]
#[case("(= (* 2 3) 6)", QueryStatus::Success)]
#[case("(= (* 2 3) 7)", QueryStatus::Failure)]
fn comparison_goals(#[case] goal: &str, #[case] expected: QueryStatus) {
    let engine = engine();
    let answer = engine.query(
        QueryKind::AskTrueFalse,
        parse_one(goal).unwrap(),
        None,
        QUERY_TIMEOUT,
    );
    assert_eq!(answer.status, expected, "goal {goal}");
}

#[test]
fn ask_true_false_carries_no_bindings() {
    let engine = engine();
    submit(&engine, "(foo A)");
    let answer = engine.query(
        QueryKind::AskTrueFalse,
        parse_one("(foo ?x)").unwrap(),
        None,
        QUERY_TIMEOUT,
    );
    assert_eq!(answer.status, QueryStatus::Success);
    assert!(answer.bindings.is_empty());
}

#[test]
fn queries_scope_to_note_plus_global() {
    let engine = engine();
    submit(&engine, "(global-fact G)");
    let note: noema::kb::NoteId = "note-q".into();
    engine.submit_term(parse_one("(note-fact N)").unwrap(), "test", Some(note.clone()));
    assert!(engine.settle(SETTLE));

    let in_note = engine.query(
        QueryKind::AskBindings,
        parse_one("(note-fact ?x)").unwrap(),
        Some(note.clone()),
        QUERY_TIMEOUT,
    );
    assert_eq!(in_note.status, QueryStatus::Success);

    let global_seen_from_note = engine.query(
        QueryKind::AskBindings,
        parse_one("(global-fact ?x)").unwrap(),
        Some(note),
        QUERY_TIMEOUT,
    );
    assert_eq!(global_seen_from_note.status, QueryStatus::Success);

    let note_seen_from_global = engine.query(
        QueryKind::AskBindings,
        parse_one("(note-fact ?x)").unwrap(),
        None,
        QUERY_TIMEOUT,
    );
    assert_eq!(note_seen_from_global.status, QueryStatus::Failure);
}
