//! The authoritative per-project conversation table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use contextrank_core::{
    ConversationGroup, Message, MessageId, PriorityContext, PriorityTier, ProjectId,
};

use crate::assigner::DEMOTED_INSTRUCTION_REASON;
use crate::window;

/// One project's conversation: messages in chronological order plus the
/// views derived from them.
///
/// Readers receive this as an immutable snapshot. Messages are shared
/// `Arc`s, so publishing a snapshot only copies pointers; a mutation
/// clones the individual records it touches.
#[derive(Debug, Clone)]
pub struct ProjectConversation {
    project_id: ProjectId,
    pub(crate) messages: Vec<Arc<Message>>,
    pub(crate) excluded: HashSet<MessageId>,
    pub(crate) current_instruction: Option<MessageId>,
    pub(crate) groups: Vec<ConversationGroup>,
    pub(crate) ordering: Vec<MessageId>,
}

impl ProjectConversation {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            messages: Vec::new(),
            excluded: HashSet::new(),
            current_instruction: None,
            groups: Vec::new(),
            ordering: Vec::new(),
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// All messages, oldest first, excluded ones included.
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Arc<Message>> {
        self.position(id).map(|idx| &self.messages[idx])
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn current_instruction_id(&self) -> Option<&MessageId> {
        self.current_instruction.as_ref()
    }

    pub fn current_instruction(&self) -> Option<&Arc<Message>> {
        self.current_instruction
            .as_ref()
            .and_then(|id| self.get(id))
    }

    /// Whether the message has left the live working set.
    pub fn is_excluded(&self, id: &MessageId) -> bool {
        self.excluded.contains(id)
    }

    /// Live message ids, highest priority first.
    pub fn priority_ordering(&self) -> &[MessageId] {
        &self.ordering
    }

    /// Live messages in priority order.
    pub fn ordered_messages(&self) -> Vec<Arc<Message>> {
        let by_id: HashMap<&MessageId, &Arc<Message>> =
            self.messages.iter().map(|m| (&m.id, m)).collect();
        self.ordering
            .iter()
            .filter_map(|id| by_id.get(id).map(|m| Arc::clone(m)))
            .collect()
    }

    pub fn groups(&self) -> &[ConversationGroup] {
        &self.groups
    }

    pub fn group_of(&self, id: &MessageId) -> Option<&ConversationGroup> {
        self.groups.iter().find(|g| g.contains(id))
    }

    /// Insert keeping chronological order; equal timestamps keep arrival order.
    pub(crate) fn insert_chronological(&mut self, message: Arc<Message>) -> usize {
        let idx = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(idx, message);
        idx
    }

    /// Restore chronological order after a timestamp change.
    pub(crate) fn resort(&mut self) {
        self.messages.sort_by_key(|m| m.created_at);
    }

    pub(crate) fn refresh_ordering(&mut self) {
        self.ordering = window::priority_ordering(&self.messages, &self.excluded);
    }

    /// Mutable access to one record, cloning it if a snapshot still shares it.
    pub(crate) fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        let idx = self.position(id)?;
        Some(Arc::make_mut(&mut self.messages[idx]))
    }

    /// Make `id` the current instruction.
    ///
    /// Every other message flagged current is demoted to `High`. Returns
    /// `false` when `id` is not in the conversation.
    pub(crate) fn promote(&mut self, id: &MessageId, reason: &str) -> bool {
        let Some(target) = self.position(id) else {
            return false;
        };

        let stale: Vec<usize> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(idx, m)| *idx != target && m.is_current_instruction())
            .map(|(idx, _)| idx)
            .collect();
        for idx in stale {
            demote(Arc::make_mut(&mut self.messages[idx]));
        }

        let record = Arc::make_mut(&mut self.messages[target]);
        let ctx = record
            .priority
            .get_or_insert_with(|| PriorityContext::current_instruction(reason));
        if !ctx.matches(PriorityTier::Critical, reason, true) {
            ctx.tier = PriorityTier::Critical;
            ctx.reason = reason.to_string();
            ctx.is_current_instruction = true;
            ctx.assigned_at = Utc::now();
        }

        self.excluded.remove(id);
        self.current_instruction = Some(id.clone());
        true
    }

    /// Overwrite one message's tier without making it current.
    ///
    /// Clears the current-instruction pointer when it pointed at `id`.
    pub(crate) fn set_tier(&mut self, id: &MessageId, tier: PriorityTier, reason: &str) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        let ctx = record
            .priority
            .get_or_insert_with(|| PriorityContext::new(tier, reason));
        ctx.tier = tier;
        ctx.reason = reason.to_string();
        ctx.is_current_instruction = false;
        ctx.assigned_at = Utc::now();

        self.excluded.remove(id);
        if self.current_instruction.as_ref() == Some(id) {
            self.current_instruction = None;
        }
        true
    }

    /// Turn a former current instruction into `High` supporting context.
    pub(crate) fn demote_instruction(&mut self, id: &MessageId) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        demote(record);
        self.excluded.remove(id);
        if self.current_instruction.as_ref() == Some(id) {
            self.current_instruction = None;
        }
        true
    }

    /// Rebuild groups from the `starts_new_topic` flags.
    pub(crate) fn regroup(&mut self) {
        let mut groups: Vec<ConversationGroup> = Vec::new();
        for message in &self.messages {
            let starts = message.priority.as_ref().is_some_and(|p| p.starts_new_topic);
            match groups.last_mut() {
                Some(group) if !starts => {
                    group.push(message.id.clone());
                }
                _ => groups.push(ConversationGroup::open(message.id.clone())),
            }
        }
        self.groups = groups;
    }
}

fn demote(message: &mut Message) {
    let ctx = message
        .priority
        .get_or_insert_with(|| PriorityContext::new(PriorityTier::High, DEMOTED_INSTRUCTION_REASON));
    ctx.tier = PriorityTier::High;
    ctx.reason = DEMOTED_INSTRUCTION_REASON.to_string();
    ctx.is_current_instruction = false;
    ctx.assigned_at = Utc::now();
}
