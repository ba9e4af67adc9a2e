//! Commit routing, retraction routing and index maintenance.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::event::{Event, EventKind, RetractionRequest};
use crate::kb::ReasonerContext;

/// Routes every candidate to its target KB for commit.
pub struct CommitPlugin;

impl super::Plugin for CommitPlugin {
    fn id(&self) -> &'static str {
        "commit"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::AssertionCandidate]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::AssertionCandidate { candidate } = event else {
            return;
        };
        let kb = ctx.kb(candidate.source_note_id.as_ref());
        kb.commit(candidate, candidate.source_id.as_str());
    }
}

/// Coordinates retraction by id, by note and by rule form.
pub struct RetractionPlugin;

impl super::Plugin for RetractionPlugin {
    fn id(&self) -> &'static str {
        "retraction"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::RetractRequested]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        let Event::RetractRequested { request, source } = event else {
            return;
        };
        match request {
            RetractionRequest::ById(id) => ctx.tms().retract(id, source),
            RetractionRequest::ByNote(note) => {
                let ids = ctx.tms().kb_members(note);
                debug!(note = %note, count = ids.len(), "retracting note");
                for id in ids {
                    ctx.tms().retract(&id, source);
                }
                ctx.remove_note_kb(note);
            }
            RetractionRequest::ByRuleForm(form) => {
                if !ctx.remove_rule_by_form(form) {
                    warn!(%source, "no rule with form {form}");
                }
            }
        }
    }
}

/// Keeps KB-side indexes consistent with TMS state changes.
///
/// Retraction drops the assertion from its KB's indexes; reactivation
/// re-indexes an assertion that was committed while inactive.
pub struct StatusPlugin;

impl super::Plugin for StatusPlugin {
    fn id(&self) -> &'static str {
        "status"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[
            EventKind::AssertionRetracted,
            EventKind::AssertionStatusChanged,
        ]
    }

    fn handle(&self, event: &Event, ctx: &Arc<ReasonerContext>) {
        match event {
            Event::AssertionRetracted { assertion, .. } => {
                if let Some(kb) = ctx.kb_by_id(&assertion.kb_id) {
                    kb.unindex_assertion(assertion);
                }
            }
            Event::AssertionStatusChanged { id, kb, active } => {
                if !active {
                    return; // stays indexed; queries filter on activity
                }
                let Some(kb) = ctx.kb_by_id(kb) else {
                    return;
                };
                if let Some(assertion) = ctx.find_assertion(id) {
                    kb.index_assertion(&assertion);
                }
            }
            _ => {}
        }
    }
}
