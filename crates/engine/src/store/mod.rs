//! The conversation store — one authoritative table per project.
//!
//! Each project has a single mutation lane (`parking_lot::Mutex`) and a
//! published snapshot (`Arc<ProjectConversation>`). A mutation runs to
//! completion inside the lane, refreshes the derived views, publishes a new
//! snapshot and emits a [`StoreEvent`]. Readers clone the snapshot `Arc`
//! and never wait for a mutation in progress.
//!
//! Store operations never fail: unknown ids and classifier failures are
//! logged, counted and absorbed.

mod hydrate;
mod project;
mod stats;

pub use hydrate::HydrateReport;
pub use project::ProjectConversation;
pub use stats::StatsSnapshot;

use std::sync::Arc;

use chrono::Utc;
use contextrank_config::AppConfig;
use contextrank_core::{
    AuthorKind, Classifier, ClassifierError, ConversationGroup, EventBus, Message, MessageId,
    MessagePatch, PriorityContext, PriorityTier, ProjectId, StoreEvent,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::assigner::{self, CURRENT_INSTRUCTION_REASON, Rule, age_at};
use crate::cache::CachedClassifier;
use crate::files::extract_file_references;
use crate::resolution;
use stats::{StoreStats, add, bump};

/// Store behaviour switches.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Make every appended user message the current instruction.
    pub promote_user_messages: bool,
    pub event_capacity: usize,
    /// Text of the notice that reseeds a cleared project.
    pub clear_notice: String,
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for StoreOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            promote_user_messages: config.store.promote_user_messages,
            event_capacity: config.store.event_capacity,
            clear_notice: config.store.clear_notice.clone(),
            cache_capacity: config.classifier.cache_capacity,
        }
    }
}

/// A project's mutation lane and its last published snapshot.
struct ProjectSlot {
    lane: Mutex<ProjectConversation>,
    published: RwLock<Arc<ProjectConversation>>,
}

impl ProjectSlot {
    fn new(project_id: ProjectId) -> Self {
        let empty = ProjectConversation::new(project_id);
        Self {
            published: RwLock::new(Arc::new(empty.clone())),
            lane: Mutex::new(empty),
        }
    }

    fn snapshot(&self) -> Arc<ProjectConversation> {
        Arc::clone(&self.published.read())
    }

    fn publish(&self, state: &ProjectConversation) {
        *self.published.write() = Arc::new(state.clone());
    }
}

/// The conversation store service. Construct one per session and share it.
pub struct ConversationStore {
    classifier: Arc<CachedClassifier>,
    options: StoreOptions,
    projects: DashMap<ProjectId, Arc<ProjectSlot>>,
    /// Which project holds each message id.
    locator: DashMap<MessageId, ProjectId>,
    events: EventBus,
    stats: StoreStats,
}

impl ConversationStore {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self::with_options(classifier, StoreOptions::default())
    }

    pub fn with_options(classifier: Arc<dyn Classifier>, options: StoreOptions) -> Self {
        info!(
            classifier = classifier.name(),
            promote_user_messages = options.promote_user_messages,
            "conversation store ready"
        );
        Self {
            classifier: Arc::new(CachedClassifier::new(classifier, options.cache_capacity)),
            events: EventBus::new(options.event_capacity),
            options,
            projects: DashMap::new(),
            locator: DashMap::new(),
            stats: StoreStats::default(),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Insert and rank a message.
    ///
    /// Classifies the message (a preset domain tag is kept), ranks it if it has no
    /// priority context, resolves earlier messages when it closes a topic,
    /// and promotes it when it is (or becomes) the current instruction.
    /// Returns the stored priority context, or `None` when the id is
    /// already taken.
    #[instrument(skip_all, fields(project = %project_id, message_id = %message.id))]
    pub fn append(&self, project_id: &ProjectId, mut message: Message) -> Option<PriorityContext> {
        let slot = self.slot(project_id);
        let mut state = slot.lane.lock();

        match self.locator.entry(message.id.clone()) {
            Entry::Occupied(owner) => {
                warn!(owner = %owner.get(), "message id already stored, ignoring append");
                return None;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(project_id.clone());
            }
        }

        self.classify(&mut message);

        let closes_topic = self
            .classifier
            .detects_closure(&message, state.messages())
            .unwrap_or_else(|err| {
                self.classifier_failed(&message.id, "detects_closure", &err);
                false
            });

        let is_current = match &message.priority {
            Some(ctx) => ctx.is_current_instruction,
            None => self.options.promote_user_messages && message.author == AuthorKind::User,
        };

        let mut excluded = false;
        let mut ctx = match message.priority.take() {
            Some(ctx) => ctx,
            None => {
                let assignment = assigner::assign(
                    self.classifier.as_ref(),
                    &message,
                    state.messages(),
                    0,
                    is_current,
                    state.current_instruction().map(|m| &**m),
                );
                if assignment.degraded.is_some() {
                    bump(&self.stats.classifier_failures);
                }
                excluded = assignment.is_excluded();
                let mut ctx = PriorityContext::new(assignment.tier, assignment.reason);
                ctx.is_current_instruction = is_current;
                ctx
            }
        };
        ctx.file_references.extend(extract_file_references(&message.content));

        let resolved = if closes_topic {
            // Only an incoming instruction supersedes the current one.
            let superseded = state.current_instruction().filter(|_| is_current).cloned();
            resolution::propagate(&message, superseded.as_deref(), &mut state.messages)
        } else {
            Vec::new()
        };

        if closes_topic || state.groups.is_empty() {
            ctx.starts_new_topic = true;
        }
        if ctx.starts_new_topic {
            ctx.related_message_ids.extend(resolved.iter().cloned());
            state.groups.push(ConversationGroup::open(message.id.clone()));
        } else if let Some(group) = state.groups.last_mut() {
            ctx.related_message_ids
                .extend(group.message_ids().iter().cloned());
            group.push(message.id.clone());
        }

        let id = message.id.clone();
        let tier = ctx.tier;
        let reason = ctx.reason.clone();
        message.priority = Some(ctx);
        state.insert_chronological(Arc::new(message));
        if excluded {
            state.excluded.insert(id.clone());
        }

        let previous = state.current_instruction_id().cloned();
        if is_current {
            state.promote(&id, &reason);
        }
        state.refresh_ordering();
        slot.publish(&state);

        bump(&self.stats.appended);
        add(&self.stats.resolutions, resolved.len());
        debug!(%tier, closes_topic, resolved = resolved.len(), "message appended");

        let now = Utc::now();
        self.events.publish(StoreEvent::MessageAppended {
            project_id: project_id.clone(),
            message_id: id.clone(),
            tier: if is_current { PriorityTier::Critical } else { tier },
            timestamp: now,
        });
        if !resolved.is_empty() {
            self.events.publish(StoreEvent::MessagesResolved {
                project_id: project_id.clone(),
                closed_by: id.clone(),
                resolved,
                timestamp: now,
            });
        }
        let current = state.current_instruction_id().cloned();
        if current != previous {
            self.events.publish(StoreEvent::CurrentInstructionChanged {
                project_id: project_id.clone(),
                previous,
                current,
                timestamp: now,
            });
        }

        state.get(&id).and_then(|m| m.priority.clone())
    }

    /// Apply a patch to a stored message.
    ///
    /// Content changes re-extract file references; timestamp changes restore
    /// chronological order. The tier is never recomputed here.
    #[instrument(skip_all, fields(message_id = %message_id))]
    pub fn update(&self, message_id: &MessageId, patch: MessagePatch) -> bool {
        let Some((project_id, slot)) = self.locate(message_id) else {
            self.unknown_id(message_id, "update");
            return false;
        };
        let mut state = slot.lane.lock();

        let effect = {
            let Some(record) = state.get_mut(message_id) else {
                self.unknown_id(message_id, "update");
                return false;
            };
            let effect = patch.apply(record);
            if effect.content_changed {
                let references = extract_file_references(&record.content);
                if let Some(ctx) = record.priority.as_mut() {
                    ctx.file_references = references;
                }
            }
            effect
        };

        if effect.is_noop() {
            debug!("patch changed nothing");
            return true;
        }
        if effect.timestamp_changed {
            state.resort();
            state.refresh_ordering();
        }
        slot.publish(&state);

        bump(&self.stats.updated);
        self.events.publish(StoreEvent::MessageUpdated {
            project_id,
            message_id: message_id.clone(),
            timestamp: Utc::now(),
        });
        true
    }

    /// Append streamed text to a message.
    ///
    /// Only the content changes: ordering, file references and events are
    /// left for the final `update` once the stream completes.
    pub fn stream_chunk(&self, message_id: &MessageId, chunk: &str) -> bool {
        let Some((_, slot)) = self.locate(message_id) else {
            self.unknown_id(message_id, "stream_chunk");
            return false;
        };
        let mut state = slot.lane.lock();
        let Some(record) = state.get_mut(message_id) else {
            self.unknown_id(message_id, "stream_chunk");
            return false;
        };
        record.content.push_str(chunk);
        slot.publish(&state);
        bump(&self.stats.streamed_chunks);
        true
    }

    /// Wipe a project and reseed it with a single "history cleared" notice.
    ///
    /// Returns the id of the notice.
    #[instrument(skip_all, fields(project = %project_id))]
    pub fn clear(&self, project_id: &ProjectId) -> MessageId {
        let slot = self.slot(project_id);
        let mut state = slot.lane.lock();

        let removed = state.len();
        for message in state.messages() {
            self.locator.remove(&message.id);
        }
        let previous = state.current_instruction_id().cloned();

        let mut notice = Message::system(self.options.clear_notice.clone());
        let mut ctx = PriorityContext::new(Rule::NoticeDefault.tier(), Rule::NoticeDefault.reason());
        ctx.starts_new_topic = true;
        notice.priority = Some(ctx);
        let notice_id = notice.id.clone();

        *state = ProjectConversation::new(project_id.clone());
        state.groups.push(ConversationGroup::open(notice_id.clone()));
        state.insert_chronological(Arc::new(notice));
        state.refresh_ordering();
        self.locator.insert(notice_id.clone(), project_id.clone());
        slot.publish(&state);

        bump(&self.stats.clears);
        info!(removed, "project cleared");

        let now = Utc::now();
        self.events.publish(StoreEvent::ProjectCleared {
            project_id: project_id.clone(),
            removed,
            timestamp: now,
        });
        if previous.is_some() {
            self.events.publish(StoreEvent::CurrentInstructionChanged {
                project_id: project_id.clone(),
                previous,
                current: None,
                timestamp: now,
            });
        }
        notice_id
    }

    /// Set a message's tier explicitly.
    ///
    /// `is_current_instruction = true` promotes the message (forcing
    /// `Critical`) and demotes the previous holder to `High`. Reapplying the
    /// values a message already has changes nothing.
    #[instrument(skip_all, fields(message_id = %message_id, tier = %tier, is_current = is_current_instruction))]
    pub fn reassign_priority(
        &self,
        message_id: &MessageId,
        tier: PriorityTier,
        reason: &str,
        is_current_instruction: bool,
    ) -> bool {
        let Some((project_id, slot)) = self.locate(message_id) else {
            self.unknown_id(message_id, "reassign_priority");
            return false;
        };
        let mut state = slot.lane.lock();

        let Some(existing) = state.get(message_id).map(|m| m.priority.clone()) else {
            self.unknown_id(message_id, "reassign_priority");
            return false;
        };

        let tier = if is_current_instruction {
            PriorityTier::Critical
        } else {
            tier
        };
        let holds_pointer = state.current_instruction_id() == Some(message_id);
        let unchanged = existing
            .as_ref()
            .is_some_and(|ctx| ctx.matches(tier, reason, is_current_instruction));
        if unchanged && holds_pointer == is_current_instruction {
            debug!("priority unchanged");
            return true;
        }

        let previous = state.current_instruction_id().cloned();
        if is_current_instruction {
            state.promote(message_id, reason);
        } else {
            state.set_tier(message_id, tier, reason);
        }
        state.refresh_ordering();
        slot.publish(&state);

        bump(&self.stats.reassignments);
        debug!(%tier, is_current_instruction, "priority reassigned");

        let now = Utc::now();
        self.events.publish(StoreEvent::PriorityReassigned {
            project_id: project_id.clone(),
            message_id: message_id.clone(),
            tier,
            timestamp: now,
        });
        let current = state.current_instruction_id().cloned();
        if current != previous {
            self.events.publish(StoreEvent::CurrentInstructionChanged {
                project_id,
                previous,
                current,
                timestamp: now,
            });
        }
        true
    }

    /// Make a message the current instruction of its project.
    pub fn mark_current_instruction(&self, message_id: &MessageId) -> bool {
        self.reassign_priority(
            message_id,
            PriorityTier::Critical,
            CURRENT_INSTRUCTION_REASON,
            true,
        )
    }

    /// Recompute every tier in a project.
    ///
    /// `current_instruction` moves the pointer first; `None` keeps it. A
    /// displaced holder is demoted to `High`. Memoized classifier answers are
    /// dropped, closure propagation is re-run for the current instruction
    /// against the messages before it, then every message is ranked again.
    /// Messages the classifier excludes leave the live ordering but stay
    /// stored. Returns the number of live messages.
    #[instrument(skip_all, fields(project = %project_id))]
    pub fn bulk_reassign(
        &self,
        project_id: &ProjectId,
        current_instruction: Option<&MessageId>,
    ) -> usize {
        let Some(slot) = self.existing_slot(project_id) else {
            warn!("bulk reassign for unknown project");
            return 0;
        };
        let mut state = slot.lane.lock();
        self.classifier.invalidate();

        let previous = state.current_instruction_id().cloned();
        let target = match current_instruction {
            Some(id) if state.get(id).is_some() => Some(id.clone()),
            Some(id) => {
                self.unknown_id(id, "bulk_reassign");
                previous.clone()
            }
            None => previous.clone(),
        };

        let resolved = match target.as_ref().and_then(|id| state.position(id)) {
            Some(pos) => self.reclose(&mut state, pos, previous.as_ref()),
            None => Vec::new(),
        };

        let history = state.messages.clone();
        let anchor = target
            .as_ref()
            .and_then(|id| history.iter().find(|m| &m.id == id))
            .cloned();
        state.excluded.clear();
        for (idx, message) in history.iter().enumerate() {
            let is_current = target.as_ref() == Some(&message.id);
            let assignment = assigner::assign(
                self.classifier.as_ref(),
                message,
                &history,
                age_at(idx, history.len()),
                is_current,
                anchor.as_deref(),
            );
            if assignment.degraded.is_some() {
                bump(&self.stats.classifier_failures);
            }
            if assignment.is_excluded() {
                state.excluded.insert(message.id.clone());
            }

            let record = Arc::make_mut(&mut state.messages[idx]);
            let ctx = record
                .priority
                .get_or_insert_with(|| PriorityContext::new(assignment.tier, ""));
            ctx.tier = assignment.tier;
            ctx.reason = assignment.reason;
            ctx.is_current_instruction = is_current;
            ctx.assigned_at = Utc::now();
        }
        drop(history);

        state.current_instruction = target.clone();
        if let Some(displaced) = previous.as_ref().filter(|id| target.as_ref() != Some(*id)) {
            state.demote_instruction(displaced);
        }
        state.refresh_ordering();
        slot.publish(&state);

        let live = state.ordering.len();
        let excluded = state.excluded.len();
        bump(&self.stats.recomputations);
        add(&self.stats.resolutions, resolved.len());
        info!(live, excluded, resolved = resolved.len(), "priorities recomputed");

        let now = Utc::now();
        if let (Some(closing), false) = (target.as_ref(), resolved.is_empty()) {
            self.events.publish(StoreEvent::MessagesResolved {
                project_id: project_id.clone(),
                closed_by: closing.clone(),
                resolved,
                timestamp: now,
            });
        }
        if target != previous {
            self.events.publish(StoreEvent::CurrentInstructionChanged {
                project_id: project_id.clone(),
                previous,
                current: target,
                timestamp: now,
            });
        }
        self.events.publish(StoreEvent::PrioritiesRecomputed {
            project_id: project_id.clone(),
            live,
            excluded,
            timestamp: now,
        });
        live
    }

    /// Re-run closure detection for the message at `pos` against the
    /// messages before it.
    fn reclose(
        &self,
        state: &mut ProjectConversation,
        pos: usize,
        previous: Option<&MessageId>,
    ) -> Vec<MessageId> {
        let closing = Arc::clone(&state.messages[pos]);
        let closes = self
            .classifier
            .detects_closure(&closing, &state.messages[..pos])
            .unwrap_or_else(|err| {
                self.classifier_failed(&closing.id, "detects_closure", &err);
                false
            });
        if !closes {
            return Vec::new();
        }
        let superseded = previous
            .filter(|id| **id != closing.id)
            .and_then(|id| state.get(id))
            .cloned();
        resolution::propagate(&closing, superseded.as_deref(), &mut state.messages[..pos])
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// The last committed state of a project.
    pub fn snapshot(&self, project_id: &ProjectId) -> Option<Arc<ProjectConversation>> {
        self.existing_slot(project_id).map(|slot| slot.snapshot())
    }

    /// Live messages, highest priority first.
    pub fn ordered_view(&self, project_id: &ProjectId) -> Vec<Arc<Message>> {
        self.snapshot(project_id)
            .map(|s| s.ordered_messages())
            .unwrap_or_default()
    }

    /// Live message ids, highest priority first.
    pub fn priority_ordering(&self, project_id: &ProjectId) -> Vec<MessageId> {
        self.snapshot(project_id)
            .map(|s| s.priority_ordering().to_vec())
            .unwrap_or_default()
    }

    /// All messages of a project, oldest first.
    pub fn messages(&self, project_id: &ProjectId) -> Vec<Arc<Message>> {
        self.snapshot(project_id)
            .map(|s| s.messages().to_vec())
            .unwrap_or_default()
    }

    pub fn groups(&self, project_id: &ProjectId) -> Vec<ConversationGroup> {
        self.snapshot(project_id)
            .map(|s| s.groups().to_vec())
            .unwrap_or_default()
    }

    pub fn current_instruction(&self, project_id: &ProjectId) -> Option<Arc<Message>> {
        self.snapshot(project_id)
            .and_then(|s| s.current_instruction().cloned())
    }

    pub fn get_message(&self, message_id: &MessageId) -> Option<Arc<Message>> {
        let (_, slot) = self.locate(message_id)?;
        slot.snapshot().get(message_id).cloned()
    }

    pub fn get_priority_context(&self, message_id: &MessageId) -> Option<PriorityContext> {
        self.get_message(message_id)
            .and_then(|m| m.priority.clone())
    }

    pub fn projects(&self) -> Vec<ProjectId> {
        self.projects.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.classifier.stats())
    }

    /// Receive every committed mutation as a [`StoreEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreEvent>> {
        self.events.subscribe()
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn slot(&self, project_id: &ProjectId) -> Arc<ProjectSlot> {
        Arc::clone(
            &self
                .projects
                .entry(project_id.clone())
                .or_insert_with(|| Arc::new(ProjectSlot::new(project_id.clone()))),
        )
    }

    fn existing_slot(&self, project_id: &ProjectId) -> Option<Arc<ProjectSlot>> {
        self.projects.get(project_id).map(|slot| Arc::clone(&slot))
    }

    fn owner_of(&self, message_id: &MessageId) -> Option<ProjectId> {
        self.locator.get(message_id).map(|owner| owner.value().clone())
    }

    fn locate(&self, message_id: &MessageId) -> Option<(ProjectId, Arc<ProjectSlot>)> {
        let project_id = self.owner_of(message_id)?;
        let slot = self.existing_slot(&project_id)?;
        Some((project_id, slot))
    }

    /// Ask the classifier about `message`. A missing domain tag is filled in;
    /// a resolved answer is merged even when the tag was preset.
    fn classify(&self, message: &mut Message) {
        match self.classifier.detect_domain(message) {
            Ok(detection) => {
                if detection.resolved {
                    message.mark_resolved(detection.resolved_at.unwrap_or(message.created_at));
                }
                if message.domain_tag.is_none() {
                    message.domain_tag = Some(detection.tag);
                }
            }
            Err(err) => self.classifier_failed(&message.id, "detect_domain", &err),
        }
    }

    fn unknown_id(&self, message_id: &MessageId, operation: &str) {
        bump(&self.stats.unknown_ids);
        warn!(%message_id, operation, "unknown message id, ignoring");
    }

    fn classifier_failed(&self, message_id: &MessageId, call: &str, err: &ClassifierError) {
        bump(&self.stats.classifier_failures);
        warn!(
            %message_id,
            call,
            classifier = self.classifier.name(),
            error = %err,
            "classifier call failed, continuing without it"
        );
    }
}
