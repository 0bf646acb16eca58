//! Reload merge: reconcile a project with the backend's copy.
//!
//! Remote wins for every id both sides know. Local messages the backend has
//! never seen (`persisted == false`) survive; local messages that were
//! persisted but are missing remotely were deleted elsewhere and go.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use contextrank_core::{Message, MessageId, PriorityContext, ProjectId, StoreEvent};
use serde::Serialize;
use tracing::{info, instrument};

use super::stats::bump;
use super::{ConversationStore, ProjectConversation};
use crate::assigner::{self, CURRENT_INSTRUCTION_REASON, age_at};
use crate::files::extract_file_references;

/// What a hydration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HydrateReport {
    /// Remote messages merged in.
    pub remote: usize,
    /// Unsent local messages kept.
    pub kept_local: usize,
    /// Persisted local messages the backend no longer has.
    pub dropped_local: usize,
    /// Remote messages that arrived without a priority and were ranked.
    pub ranked: usize,
}

impl ConversationStore {
    /// Merge the backend's messages for `project_id` into the store.
    ///
    /// Shared ids take the remote content, timestamp and classification;
    /// a resolved flag set on either side stays set, and a local priority
    /// context is kept when the remote copy carries none. The result is
    /// ordered by `created_at`. The current instruction is the newest
    /// message flagged current; every other flagged message is demoted.
    #[instrument(skip_all, fields(project = %project_id, remote = remote.len()))]
    pub fn hydrate(&self, project_id: &ProjectId, remote: Vec<Message>) -> HydrateReport {
        let slot = self.slot(project_id);
        let mut state = slot.lane.lock();
        let mut report = HydrateReport::default();

        let local: HashMap<MessageId, Arc<Message>> = state
            .messages()
            .iter()
            .map(|m| (m.id.clone(), Arc::clone(m)))
            .collect();

        let mut seen: HashSet<MessageId> = HashSet::new();
        let mut merged: Vec<Arc<Message>> = Vec::with_capacity(remote.len() + local.len());
        for mut message in remote {
            if !seen.insert(message.id.clone()) {
                continue;
            }
            message.persisted = true;
            if let Some(mine) = local.get(&message.id) {
                merge_local_state(&mut message, mine);
            }
            merged.push(Arc::new(message));
        }
        report.remote = merged.len();

        for message in state.messages() {
            if seen.contains(&message.id) {
                continue;
            }
            if message.persisted {
                report.dropped_local += 1;
                self.locator.remove(&message.id);
            } else {
                report.kept_local += 1;
                merged.push(Arc::clone(message));
            }
        }
        // Stable: on equal timestamps remote messages stay ahead of local ones.
        merged.sort_by_key(|m| m.created_at);

        let target = merged
            .iter()
            .rev()
            .find(|m| m.is_current_instruction())
            .map(|m| m.id.clone());
        let previous = state.current_instruction_id().cloned();

        let excluded: HashSet<MessageId> = state
            .excluded
            .iter()
            .filter(|id| merged.iter().any(|m| &m.id == *id))
            .cloned()
            .collect();

        *state = ProjectConversation::new(project_id.clone());
        state.messages = merged;
        state.excluded = excluded;

        report.ranked = self.rank_unranked(&mut state, target.as_ref());
        if let Some(id) = &target {
            let reason = state
                .get(id)
                .and_then(|m| m.priority.as_ref())
                .map_or(CURRENT_INSTRUCTION_REASON.to_string(), |p| p.reason.clone());
            state.promote(id, &reason);
        }
        state.regroup();
        state.refresh_ordering();
        for message in state.messages() {
            self.locator.insert(message.id.clone(), project_id.clone());
        }
        slot.publish(&state);

        bump(&self.stats.hydrations);
        info!(
            remote = report.remote,
            kept_local = report.kept_local,
            dropped_local = report.dropped_local,
            ranked = report.ranked,
            "project hydrated"
        );

        let now = Utc::now();
        self.events.publish(StoreEvent::ProjectHydrated {
            project_id: project_id.clone(),
            remote: report.remote,
            kept_local: report.kept_local,
            timestamp: now,
        });
        let current = state.current_instruction_id().cloned();
        if current != previous {
            self.events.publish(StoreEvent::CurrentInstructionChanged {
                project_id: project_id.clone(),
                previous,
                current,
                timestamp: now,
            });
        }
        report
    }

    /// Classify and rank every message that has no priority context yet.
    fn rank_unranked(&self, state: &mut ProjectConversation, target: Option<&MessageId>) -> usize {
        let pending: Vec<usize> = state
            .messages()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.priority.is_none())
            .map(|(idx, _)| idx)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        for &idx in &pending {
            self.classify(Arc::make_mut(&mut state.messages[idx]));
        }

        let history = state.messages.clone();
        let anchor = target.and_then(|id| history.iter().find(|m| &m.id == id)).cloned();
        for &idx in &pending {
            let message = &history[idx];
            let assignment = assigner::assign(
                self.classifier.as_ref(),
                message,
                &history,
                age_at(idx, history.len()),
                false,
                anchor.as_deref(),
            );
            if assignment.degraded.is_some() {
                bump(&self.stats.classifier_failures);
            }
            if assignment.is_excluded() {
                state.excluded.insert(message.id.clone());
            }
            let mut ctx = PriorityContext::new(assignment.tier, assignment.reason);
            ctx.file_references = extract_file_references(&message.content);
            Arc::make_mut(&mut state.messages[idx]).priority = Some(ctx);
        }
        pending.len()
    }
}

/// Carry local-only knowledge onto the remote copy of a shared message.
fn merge_local_state(remote: &mut Message, local: &Message) {
    if remote.priority.is_none() {
        remote.priority = local.priority.clone();
    }
    if remote.domain_tag.is_none() {
        remote.domain_tag = local.domain_tag.clone();
    }
    if let (true, Some(at)) = (local.is_resolved(), local.resolved_at) {
        remote.mark_resolved(at);
    }
}
