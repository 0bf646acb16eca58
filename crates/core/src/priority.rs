//! Priority tiers and the per-message priority context.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::MessageId;

/// Ordinal priority bucket controlling inclusion in the model's context window.
///
/// Variants are declared highest priority first, so the derived `Ord` sorts
/// `Critical` before `BackgroundContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
    Low,
    BackgroundContext,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::BackgroundContext,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::BackgroundContext => "background",
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Priority state the store keeps for each message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityContext {
    pub tier: PriorityTier,

    /// Diagnostic text explaining the assignment.
    pub reason: String,

    pub assigned_at: DateTime<Utc>,

    /// At most one message per project carries `true`, always at `Critical`.
    #[serde(default)]
    pub is_current_instruction: bool,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub related_message_ids: BTreeSet<MessageId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub file_references: BTreeSet<String>,

    #[serde(default)]
    pub starts_new_topic: bool,
}

impl PriorityContext {
    pub fn new(tier: PriorityTier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            reason: reason.into(),
            assigned_at: Utc::now(),
            is_current_instruction: false,
            related_message_ids: BTreeSet::new(),
            file_references: BTreeSet::new(),
            starts_new_topic: false,
        }
    }

    /// Context for the project's current instruction.
    pub fn current_instruction(reason: impl Into<String>) -> Self {
        Self {
            is_current_instruction: true,
            ..Self::new(PriorityTier::Critical, reason)
        }
    }

    /// Whether applying `(tier, reason, is_current)` would change nothing.
    pub fn matches(&self, tier: PriorityTier, reason: &str, is_current: bool) -> bool {
        self.tier == tier && self.reason == reason && self.is_current_instruction == is_current
    }
}
