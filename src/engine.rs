//! Engine wiring and lifecycle.
//!
//! [`Engine::new`] builds the event bus, the shared reasoner context and
//! the standard plugin set, and exposes the library API the external
//! collaborators (UI, transport, LLM bridge) sit on: submit, retract,
//! query, pause/resume, shutdown.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::base::{Config, RunGate};
use crate::event::{
    Event, EventBus, EventKind, Query, QueryAnswer, QueryKind, QueryStatus, RetractionRequest,
};
use crate::kb::{AssertionId, NoteId, ReasonerContext};
use crate::reason::{register, standard_plugins};
use crate::term::{ParseError, Term, parse_all};

/// Startup failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start dispatch pool: {0}")]
    Pool(#[from] crate::event::BusBuildError),
}

/// The assembled reasoning engine.
pub struct Engine {
    ctx: Arc<ReasonerContext>,
    bus: Arc<EventBus>,
    gate: Arc<RunGate>,
    pending_queries: Arc<Mutex<FxHashMap<SmolStr, mpsc::Sender<QueryAnswer>>>>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, EngineError> {
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::new(config.worker_threads)?);
        let gate = Arc::new(RunGate::new());
        let ctx = Arc::new(ReasonerContext::new(
            Arc::clone(&config),
            Arc::clone(&bus),
            Arc::clone(&gate),
        ));
        for plugin in standard_plugins() {
            register(&bus, &ctx, plugin);
        }

        let pending_queries: Arc<Mutex<FxHashMap<SmolStr, mpsc::Sender<QueryAnswer>>>> =
            Arc::new(Mutex::new(FxHashMap::default()));
        let pending = Arc::clone(&pending_queries);
        bus.subscribe(EventKind::QueryAnswered, move |event| {
            let Event::QueryAnswered { answer } = event else {
                return;
            };
            if let Some(sender) = pending.lock().remove(&answer.id) {
                let _ = sender.send(answer.clone());
            }
        });

        info!("engine started");
        Ok(Self {
            ctx,
            bus,
            gate,
            pending_queries,
        })
    }

    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(Config::default())
    }

    pub fn context(&self) -> &Arc<ReasonerContext> {
        &self.ctx
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Submit one already-parsed term as external input.
    pub fn submit_term(&self, term: Term, source: &str, note: Option<NoteId>) {
        self.bus.publish(Event::InputReceived {
            term,
            source: SmolStr::new(source),
            note,
        });
    }

    /// Parse and submit every top-level term in `text`. Returns how many
    /// terms were submitted, or the first parse error.
    pub fn submit_text(
        &self,
        text: &str,
        source: &str,
        note: Option<NoteId>,
    ) -> Result<usize, ParseError> {
        let terms = parse_all(text)?;
        let count = terms.len();
        for term in terms {
            self.submit_term(term, source, note.clone());
        }
        Ok(count)
    }

    /// Retract an assertion by id.
    pub fn retract(&self, id: AssertionId, source: &str) {
        self.bus.publish(Event::RetractRequested {
            request: RetractionRequest::ById(id),
            source: SmolStr::new(source),
        });
    }

    /// Retract everything in a note's KB and drop the KB.
    pub fn retract_note(&self, note: NoteId, source: &str) {
        self.bus.publish(Event::RetractRequested {
            request: RetractionRequest::ByNote(note),
            source: SmolStr::new(source),
        });
    }

    /// Remove any rule whose form equals `form`.
    pub fn retract_rule_form(&self, form: Term, source: &str) {
        self.bus.publish(Event::RetractRequested {
            request: RetractionRequest::ByRuleForm(form),
            source: SmolStr::new(source),
        });
    }

    /// Prove a goal and wait for the answer, up to `timeout`.
    pub fn query(
        &self,
        kind: QueryKind,
        pattern: Term,
        kb: Option<NoteId>,
        timeout: Duration,
    ) -> QueryAnswer {
        let id = self.ctx.ids().next("query_");
        let (sender, receiver) = mpsc::channel();
        self.pending_queries.lock().insert(id.clone(), sender);
        self.bus.publish(Event::QueryRequested {
            query: Query {
                id: id.clone(),
                kind,
                pattern,
                kb,
            },
        });
        match receiver.recv_timeout(timeout) {
            Ok(answer) => answer,
            Err(_) => {
                self.pending_queries.lock().remove(&id);
                warn!(query = %id, "query timed out");
                QueryAnswer {
                    id,
                    status: QueryStatus::Timeout,
                    bindings: Vec::new(),
                    explanation: None,
                }
            }
        }
    }

    /// Block new reasoning work at the next safe point.
    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Wait until the event cascade settles. Returns `true` when no work
    /// is left in flight.
    pub fn settle(&self, timeout: Duration) -> bool {
        self.bus.wait_quiescent(timeout)
    }

    /// Cooperative shutdown: stops the gate so paused workers abort;
    /// in-flight events are abandoned when the engine drops.
    pub fn shutdown(&self) {
        info!("engine stopping");
        self.gate.stop();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.gate.stop();
    }
}
