//! Resolution propagation for topic-closing messages.
//!
//! When a message closes a topic, recent messages about that topic are marked
//! resolved. The scan is bounded to the last [`CLOSURE_WINDOW`] messages and
//! only touches messages whose domain tag matches the closing references;
//! unrelated history is never resolved.

use std::sync::Arc;

use contextrank_core::{DomainTag, Message, MessageId};
use tracing::debug;

/// How far back a closure signal reaches.
pub const CLOSURE_WINDOW: usize = 10;

/// The topics a closing message closes.
#[derive(Debug, Clone, Default)]
pub struct ClosureScope<'a> {
    references: Vec<&'a DomainTag>,
}

impl<'a> ClosureScope<'a> {
    /// Scope for `closing`, plus the instruction it supersedes when that
    /// instruction lies inside `window`.
    pub fn new(
        closing: &'a Message,
        superseded: Option<&'a Message>,
        window: &[Arc<Message>],
    ) -> Self {
        let mut references = Vec::new();
        if let Some(tag) = &closing.domain_tag {
            references.push(tag);
        }
        if let Some(prev) = superseded {
            let in_window = window.iter().any(|m| m.id == prev.id);
            if let (true, Some(tag)) = (in_window, &prev.domain_tag) {
                references.push(tag);
            }
        }
        Self { references }
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Whether `candidate` belongs to one of the closed topics.
    pub fn covers(&self, candidate: &Message) -> bool {
        candidate
            .domain_tag
            .as_ref()
            .is_some_and(|tag| self.references.iter().any(|r| r.shares_topic_with(tag)))
    }
}

/// The slice of `history` a closure signal may reach.
pub fn closure_window(history: &[Arc<Message>]) -> std::ops::Range<usize> {
    history.len().saturating_sub(CLOSURE_WINDOW)..history.len()
}

/// Mark messages in the tail of `history` resolved when `scope` covers them.
///
/// Updates the records in `history` in place and returns the ids that
/// changed, newest first. Already-resolved messages are skipped.
pub fn propagate(
    closing: &Message,
    superseded: Option<&Message>,
    history: &mut [Arc<Message>],
) -> Vec<MessageId> {
    let range = closure_window(history);
    // The scope borrows tags from the window, so match first, then write.
    let matched: Vec<usize> = {
        let window = &history[range.clone()];
        let scope = ClosureScope::new(closing, superseded, window);
        if scope.is_empty() {
            return Vec::new();
        }
        range
            .clone()
            .rev()
            .filter(|&idx| {
                let candidate = &history[idx];
                !candidate.is_resolved() && candidate.id != closing.id && scope.covers(candidate)
            })
            .collect()
    };

    let mut resolved = Vec::with_capacity(matched.len());
    for idx in matched {
        let record = Arc::make_mut(&mut history[idx]);
        if record.mark_resolved(closing.created_at) {
            resolved.push(record.id.clone());
        }
    }

    if !resolved.is_empty() {
        debug!(
            closing = %closing.id,
            count = resolved.len(),
            "closure resolved earlier messages"
        );
    }
    resolved
}
