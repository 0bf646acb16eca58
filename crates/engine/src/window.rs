//! Context window building — the read side of the engine.
//!
//! The store caches a priority ordering on every commit using
//! [`priority_ordering`]; readers get it back as an ordered view without any
//! classifier work. [`ContextWindowBuilder`] then fits an ordered view into a
//! token budget for prompt assembly.
//!
//! # Ordering
//!
//! Live messages sort by tier (Critical first), then by their timestamp,
//! then by their chronological position in the conversation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use contextrank_config::WindowConfig;
use contextrank_core::{Message, MessageId, PriorityTier, ProjectId};
use serde::Serialize;

use crate::store::ConversationStore;
use crate::token;

/// Tier used for ordering; unranked messages sort as `Low`.
pub fn tier_of(message: &Message) -> PriorityTier {
    message
        .priority
        .as_ref()
        .map_or(PriorityTier::Low, |p| p.tier)
}

/// The priority ordering of `messages` (chronological) minus `excluded`.
pub fn priority_ordering(
    messages: &[Arc<Message>],
    excluded: &HashSet<MessageId>,
) -> Vec<MessageId> {
    let mut live: Vec<(usize, &Arc<Message>)> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| !excluded.contains(&m.id))
        .collect();
    live.sort_by(|(ia, a), (ib, b)| {
        tier_of(a)
            .cmp(&tier_of(b))
            .then(a.created_at.cmp(&b.created_at))
            .then(ia.cmp(ib))
    });
    live.into_iter().map(|(_, m)| m.id.clone()).collect()
}

/// Limits applied when fitting a view into a prompt.
#[derive(Debug, Clone)]
pub struct WindowBudget {
    pub token_budget: usize,
    pub include_background: bool,
    pub drop_resolved_low: bool,
}

impl Default for WindowBudget {
    fn default() -> Self {
        Self::from(&WindowConfig::default())
    }
}

impl From<&WindowConfig> for WindowBudget {
    fn from(config: &WindowConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            include_background: config.include_background,
            drop_resolved_low: config.drop_resolved_low,
        }
    }
}

/// Statistics about one fitted window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub budget: usize,
    pub tokens: usize,
    pub included: usize,
    /// Skipped because they did not fit.
    pub dropped: usize,
    /// Skipped by tier/resolution filters before budgeting.
    pub filtered: usize,
    pub per_tier: BTreeMap<PriorityTier, usize>,
}

/// Messages selected for a prompt, in chronological order.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    pub messages: Vec<Arc<Message>>,
    pub stats: WindowStats,
}

/// Fits ordered views into a token budget. Stateless — create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextWindowBuilder {
    budget: WindowBudget,
}

impl ContextWindowBuilder {
    pub fn new(budget: WindowBudget) -> Self {
        Self { budget }
    }

    /// Fit the current ordered view of `project_id`.
    pub fn build(&self, store: &ConversationStore, project_id: &ProjectId) -> ContextWindow {
        self.fit(&store.ordered_view(project_id))
    }

    /// Fill the budget in priority order.
    ///
    /// The current instruction is always included. Other messages are taken
    /// first-fit: one that does not fit is skipped and smaller ones after it
    /// may still be taken.
    pub fn fit(&self, ordered: &[Arc<Message>]) -> ContextWindow {
        let mut stats = WindowStats {
            budget: self.budget.token_budget,
            ..WindowStats::default()
        };
        let mut selected: Vec<Arc<Message>> = Vec::new();

        for message in ordered {
            let tier = tier_of(message);
            if self.filtered_out(message, tier) {
                stats.filtered += 1;
                continue;
            }

            let cost = token::estimate_message_tokens(message);
            let fits = stats.tokens + cost <= self.budget.token_budget;
            if !(fits || message.is_current_instruction()) {
                stats.dropped += 1;
                continue;
            }

            stats.tokens += cost;
            stats.included += 1;
            *stats.per_tier.entry(tier).or_default() += 1;
            selected.push(Arc::clone(message));
        }

        selected.sort_by_key(|m| m.created_at);
        ContextWindow {
            messages: selected,
            stats,
        }
    }

    fn filtered_out(&self, message: &Message, tier: PriorityTier) -> bool {
        match tier {
            PriorityTier::BackgroundContext => !self.budget.include_background,
            PriorityTier::Low => self.budget.drop_resolved_low && message.is_resolved(),
            _ => false,
        }
    }
}
