//! Reasoner plugins.
//!
//! Each plugin subscribes to event kinds and reacts by publishing more
//! events, usually [`Event::AssertionCandidate`]s. Plugins catch their
//! own failures, log them and produce nothing rather than propagate, and
//! must be idempotent: the bus gives no total ordering across events, so
//! a plugin can observe the same assertion twice.

pub mod backward;
pub mod commit;
pub mod forward;
pub mod input;
pub mod instantiate;
pub mod operators;
pub mod rewrite;

use std::sync::Arc;

use crate::event::{Event, EventBus, EventKind};
use crate::kb::ReasonerContext;

/// A registered reasoner.
pub trait Plugin: Send + Sync + 'static {
    fn id(&self) -> &'static str;

    /// The event kinds this plugin wants.
    fn subscriptions(&self) -> &'static [EventKind];

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>);
}

/// Wire a plugin into the bus. Handlers run on the dispatch pool and
/// respect the pause gate before doing any work.
pub fn register(bus: &Arc<EventBus>, ctx: &Arc<ReasonerContext>, plugin: Arc<dyn Plugin>) {
    for kind in plugin.subscriptions() {
        let plugin = Arc::clone(&plugin);
        let ctx = Arc::clone(ctx);
        bus.subscribe(*kind, move |event| {
            if !ctx.gate().wait_if_paused() {
                return;
            }
            plugin.handle(event, &ctx);
        });
    }
}

/// The standard plugin set, in registration order.
pub fn standard_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(input::InputPlugin),
        Arc::new(commit::CommitPlugin),
        Arc::new(commit::RetractionPlugin),
        Arc::new(commit::StatusPlugin),
        Arc::new(forward::ForwardChainer),
        Arc::new(rewrite::RewritePlugin),
        Arc::new(instantiate::InstantiationPlugin),
        Arc::new(backward::BackwardChainer::new()),
    ]
}
