#![allow(clippy::unwrap_used)]
//! KIF file loading: block accumulation and skip-with-warning behavior.

use std::io::Write;
use std::time::Duration;

use noema::source::{load_kif_file, load_kif_str};
use noema::{Config, Engine, parse_one};

const SETTLE: Duration = Duration::from_secs(5);

fn engine() -> Engine {
    Engine::new(Config::default().with_worker_threads(2)).unwrap()
}

fn has_fact(engine: &Engine, src: &str) -> bool {
    let kif = parse_one(src).unwrap();
    engine
        .context()
        .global_kb()
        .all_active()
        .iter()
        .any(|a| a.kif == kif)
}

#[test]
fn loads_rules_and_facts_from_text() {
    let engine = engine();
    let report = load_kif_str(
        &engine,
        "; taxonomy\n\
         (=> (and (subclass ?x ?y) (subclass ?y ?z)) (subclass ?x ?z))\n\
         (subclass Dog Mammal)\n\
         (subclass Mammal Animal)\n",
        "file",
        None,
    );
    assert_eq!(report.submitted, 3);
    assert!(report.skipped.is_empty());
    assert!(engine.settle(SETTLE));
    assert!(has_fact(&engine, "(subclass Dog Animal)"));
}

#[test]
fn malformed_blocks_are_skipped_not_fatal() {
    let engine = engine();
    let report = load_kif_str(
        &engine,
        "(good A)\n(bad ?)\n(also-good B)\n",
        "file",
        None,
    );
    assert_eq!(report.submitted, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].line, 2);
    assert!(engine.settle(SETTLE));
    assert!(has_fact(&engine, "(good A)"));
    assert!(has_fact(&engine, "(also-good B)"));
}

#[test]
fn multiline_forms_and_strings_survive_splitting() {
    let engine = engine();
    let report = load_kif_str(
        &engine,
        "(says Alice\n  \"two ; (words\")\n(p A)",
        "file",
        None,
    );
    assert_eq!(report.submitted, 2);
    assert!(engine.settle(SETTLE));
    assert!(has_fact(&engine, "(p A)"));
}

#[test]
fn loads_from_a_file_on_disk() {
    let engine = engine();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(stored-in File)").unwrap();
    writeln!(file, "(=> (stored-in ?x) (loaded ?x))").unwrap();
    file.flush().unwrap();

    let report = load_kif_file(&engine, file.path(), "file", None).unwrap();
    assert_eq!(report.submitted, 2);
    assert!(engine.settle(SETTLE));
    assert!(has_fact(&engine, "(stored-in File)"));
}

#[test]
fn missing_file_is_an_error() {
    let engine = engine();
    assert!(load_kif_file(&engine, "/nonexistent/rules.kif", "file", None).is_err());
}
