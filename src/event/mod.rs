//! Typed publish/subscribe event bus.
//!
//! Every event is dispatched as one task on a shared rayon pool; the
//! listeners for that event run sequentially inside the task, so
//! reasoner plugins execute in parallel with the producer. Listener
//! tables are snapshotted under a read lock before dispatch, and an
//! in-flight counter with a condvar lets callers wait for the derivation
//! cascade to settle.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::error;

use crate::base::Name;
use crate::kb::{Assertion, AssertionId, KbId, NoteId, PotentialAssertion, Rule};
use crate::term::{Bindings, Term, unify};

/// What a query wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// All binding sets proving the pattern.
    AskBindings,
    /// Only whether the pattern is provable.
    AskTrueFalse,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub id: SmolStr,
    pub kind: QueryKind,
    pub pattern: Term,
    pub kb: Option<NoteId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    Failure,
    Timeout,
    Error,
}

/// The published answer to a [`Query`], correlated by query id.
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub id: SmolStr,
    pub status: QueryStatus,
    pub bindings: Vec<Bindings>,
    pub explanation: Option<String>,
}

/// A retraction command routed through the bus.
#[derive(Debug, Clone)]
pub enum RetractionRequest {
    ById(AssertionId),
    ByNote(NoteId),
    ByRuleForm(Term),
}

/// Everything that moves through the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// Raw external input before routing.
    InputReceived {
        term: Term,
        source: SmolStr,
        note: Option<NoteId>,
    },
    /// A candidate ready for commit to its target KB.
    AssertionCandidate { candidate: PotentialAssertion },
    RuleAdded { rule: Rule },
    RuleRemoved { rule: Rule },
    AssertionAdded { assertion: Assertion },
    AssertionRetracted { assertion: Assertion, source: SmolStr },
    AssertionEvicted { assertion: Assertion },
    AssertionStatusChanged {
        id: AssertionId,
        kb: KbId,
        active: bool,
    },
    ContradictionDetected { ids: Vec<AssertionId>, kb: KbId },
    RetractRequested {
        request: RetractionRequest,
        source: SmolStr,
    },
    QueryRequested { query: Query },
    QueryAnswered { answer: QueryAnswer },
}

/// Discriminant for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InputReceived,
    AssertionCandidate,
    RuleAdded,
    RuleRemoved,
    AssertionAdded,
    AssertionRetracted,
    AssertionEvicted,
    AssertionStatusChanged,
    ContradictionDetected,
    RetractRequested,
    QueryRequested,
    QueryAnswered,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::InputReceived { .. } => EventKind::InputReceived,
            Event::AssertionCandidate { .. } => EventKind::AssertionCandidate,
            Event::RuleAdded { .. } => EventKind::RuleAdded,
            Event::RuleRemoved { .. } => EventKind::RuleRemoved,
            Event::AssertionAdded { .. } => EventKind::AssertionAdded,
            Event::AssertionRetracted { .. } => EventKind::AssertionRetracted,
            Event::AssertionEvicted { .. } => EventKind::AssertionEvicted,
            Event::AssertionStatusChanged { .. } => EventKind::AssertionStatusChanged,
            Event::ContradictionDetected { .. } => EventKind::ContradictionDetected,
            Event::RetractRequested { .. } => EventKind::RetractRequested,
            Event::QueryRequested { .. } => EventKind::QueryRequested,
            Event::QueryAnswered { .. } => EventKind::QueryAnswered,
        }
    }

    /// The term pattern listeners are keyed on, when the event carries
    /// an asserted kif.
    fn pattern_term(&self) -> Option<&Term> {
        match self {
            Event::AssertionAdded { assertion } => Some(&assertion.kif),
            Event::AssertionCandidate { candidate } => Some(&candidate.kif),
            _ => None,
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    by_kind: IndexMap<EventKind, Vec<Listener>>,
    /// Pattern subscriptions keyed by the template's operator.
    by_pattern: FxHashMap<Name, Vec<(Term, Listener)>>,
}

/// The engine-wide bus.
pub struct EventBus {
    pool: rayon::ThreadPool,
    listeners: RwLock<Listeners>,
    in_flight: Mutex<usize>,
    quiet: Condvar,
}

/// Failure to build the dispatch pool at startup.
pub type BusBuildError = rayon::ThreadPoolBuildError;

impl EventBus {
    /// Build a bus with the given worker count; 0 picks rayon's default.
    pub fn new(worker_threads: usize) -> Result<Self, BusBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("noema-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            listeners: RwLock::new(Listeners::default()),
            in_flight: Mutex::new(0),
            quiet: Condvar::new(),
        })
    }

    /// Subscribe to every event of one kind.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.listeners
            .write()
            .by_kind
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Subscribe to asserted kifs unifying with `template`. The template
    /// must be a list with an operator; that operator keys the table.
    pub fn subscribe_pattern(
        &self,
        template: Term,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> bool {
        let Some(operator) = template.operator().cloned() else {
            return false;
        };
        self.listeners
            .write()
            .by_pattern
            .entry(operator)
            .or_default()
            .push((template, Arc::new(listener)));
        true
    }

    /// Dispatch an event on the pool. Returns immediately.
    pub fn publish(self: &Arc<Self>, event: Event) {
        {
            let mut count = self.in_flight.lock();
            *count += 1;
        }
        let bus = Arc::clone(self);
        self.pool.spawn(move || {
            bus.dispatch(&event);
            let mut count = bus.in_flight.lock();
            *count -= 1;
            if *count == 0 {
                bus.quiet.notify_all();
            }
        });
    }

    fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        let direct: Vec<Listener> = {
            let listeners = self.listeners.read();
            listeners
                .by_kind
                .get(&kind)
                .map(|ls| ls.to_vec())
                .unwrap_or_default()
        };
        for listener in direct {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(?kind, "event listener panicked");
            }
        }

        let Some(term) = event.pattern_term() else {
            return;
        };
        let Some(operator) = term.operator().cloned() else {
            return;
        };
        let matching: Vec<(Term, Listener)> = {
            let listeners = self.listeners.read();
            listeners
                .by_pattern
                .get(&operator)
                .map(|ls| ls.to_vec())
                .unwrap_or_default()
        };
        for (template, listener) in matching {
            if unify(&template, term, &Bindings::new()).is_none() {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(?kind, "pattern listener panicked");
            }
        }
    }

    /// Block until no events are queued or running, or until `timeout`.
    /// Returns `true` when quiescent.
    pub fn wait_quiescent(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            if self.quiet.wait_until(&mut count, deadline).timed_out() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_one;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn input_event(src: &str) -> Event {
        Event::InputReceived {
            term: parse_one(src).unwrap(),
            source: SmolStr::new("test"),
            note: None,
        }
    }

    #[test]
    fn kind_listeners_receive_matching_events() {
        let bus = Arc::new(EventBus::new(2).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::InputReceived, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(input_event("(p A)"));
        bus.publish(input_event("(q B)"));
        assert!(bus.wait_quiescent(Duration::from_secs(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listeners_of_other_kinds_are_not_invoked() {
        let bus = Arc::new(EventBus::new(2).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::RuleAdded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(input_event("(p A)"));
        assert!(bus.wait_quiescent(Duration::from_secs(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_poison_the_bus() {
        let bus = Arc::new(EventBus::new(2).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventKind::InputReceived, |_| panic!("boom"));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::InputReceived, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(input_event("(p A)"));
        assert!(bus.wait_quiescent(Duration::from_secs(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
