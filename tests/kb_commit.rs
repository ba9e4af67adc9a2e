#![allow(clippy::unwrap_used)]
//! Commit pipeline and truth-maintenance properties.

use std::time::Duration;

use rustc_hash::FxHashSet;

use noema::kb::PotentialAssertion;
use noema::{AssertionKind, Config, Engine, parse_one};

const SETTLE: Duration = Duration::from_secs(5);

fn engine_with_capacity(capacity: usize) -> Engine {
    Engine::new(
        Config::default()
            .with_kb_capacity(capacity)
            .with_worker_threads(2),
    )
    .unwrap()
}

fn candidate(src: &str, priority: f64) -> PotentialAssertion {
    PotentialAssertion::new(parse_one(src).unwrap(), priority, "test".into())
}

#[test]
fn trivial_candidates_are_rejected() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    assert!(kb.commit(&candidate("(instance A A)", 0.5), "test").is_none());
    assert!(kb.commit(&candidate("(= B B)", 0.5), "test").is_none());
    assert!(kb
        .commit(&candidate("(not (same C C))", 0.5), "test")
        .is_none());
    assert_eq!(kb.size(), 0);
}

#[test]
fn duplicate_kifs_are_rejected() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    assert!(kb.commit(&candidate("(p A)", 0.5), "test").is_some());
    assert!(kb.commit(&candidate("(p A)", 0.9), "test").is_none());
    assert_eq!(kb.size(), 1);
}

#[test]
fn subsumed_candidates_are_rejected() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    assert!(kb.commit(&candidate("(p ?x)", 0.5), "test").is_some());
    assert!(engine.settle(SETTLE));
    assert!(kb.commit(&candidate("(p A)", 0.5), "test").is_none());
    // Opposite polarity is not subsumed.
    assert!(kb.commit(&candidate("(not (p A))", 0.5), "test").is_some());
}

#[test]
fn skolem_ground_candidates_are_stored_skolemized() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let stored = kb
        .commit(&candidate("(owner skc_k_1 Alice)", 0.5), "test")
        .unwrap();
    assert_eq!(stored.kind, AssertionKind::Skolemized);
    let stored = kb
        .commit(&candidate("(owner (skf_k_2 Bob) Bob)", 0.5), "test")
        .unwrap();
    assert_eq!(stored.kind, AssertionKind::Skolemized);
}

#[test]
fn commit_refuses_when_nothing_can_be_evicted() {
    let engine = engine_with_capacity(1);
    let kb = engine.context().global_kb();
    // A universal occupies the only slot but is not in the eviction queue.
    let universal = candidate("(forall (?x) (likes ?x Tea))", 0.5)
        .with_kind(AssertionKind::Universal)
        .with_quantified_vars(vec![noema::Name::new("?x")]);
    assert!(kb.commit(&universal, "test").is_some());
    assert!(kb.commit(&candidate("(p A)", 0.9), "test").is_none());
    assert_eq!(kb.size(), 1);
}

#[test]
fn supported_assertions_start_active_and_follow_their_support() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let tms = engine.context().tms();

    let base = kb.commit(&candidate("(p A)", 0.5), "test").unwrap();
    let mut support = FxHashSet::default();
    support.insert(base.id.clone());
    let derived = kb
        .commit(&candidate("(q A)", 0.5).with_support(support), "test")
        .unwrap();
    assert!(derived.active);

    tms.retract(&base.id, "test");
    assert!(engine.settle(SETTLE));
    assert!(!tms.is_active(&derived.id));
    assert!(tms.get(&derived.id).is_some(), "dependent stays stored");
}

#[test]
fn retraction_deactivates_all_dependents_once() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let tms = engine.context().tms();

    let a = kb.commit(&candidate("(a X)", 0.5), "test").unwrap();
    let mut support = FxHashSet::default();
    support.insert(a.id.clone());
    let b = kb
        .commit(&candidate("(b X)", 0.5).with_support(support.clone()), "test")
        .unwrap();
    let c = kb
        .commit(&candidate("(c X)", 0.5).with_support(support), "test")
        .unwrap();

    tms.retract(&a.id, "test");
    assert!(engine.settle(SETTLE));
    assert!(tms.get(&a.id).is_none());
    assert!(!tms.is_active(&b.id));
    assert!(!tms.is_active(&c.id));
}

#[test]
fn chained_support_cascades_through_intermediate_derivations() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let tms = engine.context().tms();

    let a = kb.commit(&candidate("(a X)", 0.5), "test").unwrap();
    let mut support_a = FxHashSet::default();
    support_a.insert(a.id.clone());
    let b = kb
        .commit(&candidate("(b X)", 0.5).with_support(support_a), "test")
        .unwrap();
    let mut support_b = FxHashSet::default();
    support_b.insert(b.id.clone());
    let c = kb
        .commit(&candidate("(c X)", 0.5).with_support(support_b), "test")
        .unwrap();

    tms.retract(&a.id, "test");
    assert!(engine.settle(SETTLE));
    assert!(!tms.is_active(&b.id));
    assert!(!tms.is_active(&c.id));
}

#[test]
fn unknown_supporters_are_rejected() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let mut support = FxHashSet::default();
    support.insert("fact_missing".into());
    assert!(kb
        .commit(&candidate("(q A)", 0.5).with_support(support), "test")
        .is_none());
}

#[test]
fn queries_exclude_other_kbs_and_retracted_assertions() {
    let engine = engine_with_capacity(16);
    let note: noema::kb::NoteId = "note-kb".into();
    let note_kb = engine.context().kb(Some(&note));
    let global = engine.context().global_kb();

    let stored = note_kb.commit(&candidate("(p A)", 0.5), "test").unwrap();
    let pattern = parse_one("(p ?x)").unwrap();
    assert_eq!(note_kb.find_unifiable(&pattern).len(), 1);
    assert!(global.find_unifiable(&pattern).is_empty());

    engine.context().tms().retract(&stored.id, "test");
    assert!(engine.settle(SETTLE));
    assert!(note_kb.find_unifiable(&pattern).is_empty());
}

#[test]
fn derived_depth_and_priority_helpers() {
    let engine = engine_with_capacity(16);
    let kb = engine.context().global_kb();
    let ctx = engine.context();

    let shallow = kb.commit(&candidate("(p A)", 0.8), "test").unwrap();
    let mut support = FxHashSet::default();
    support.insert(shallow.id.clone());
    let deep = kb
        .commit(
            &candidate("(q A)", 0.4).with_support(support.clone()).with_depth(3),
            "test",
        )
        .unwrap();

    let mut both = FxHashSet::default();
    both.insert(shallow.id.clone());
    both.insert(deep.id.clone());
    assert_eq!(ctx.derived_depth(&both), 4);
    let expected = 0.4 * ctx.config().derived_priority_decay;
    assert!((ctx.derived_priority(&both) - expected).abs() < 1e-9);
}
