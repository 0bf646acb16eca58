//! Partial message updates.
//!
//! Each variant names exactly which fields it touches; [`MessagePatch::apply`]
//! is the single merge function. Priority is never part of a patch: tiers
//! change only through explicit reassignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{DomainTag, Message};

/// A state change applied to an existing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePatch {
    /// A streamed chunk appended to the end of the content.
    AppendChunk { text: String },

    /// A full content replacement (user edit, final streamed text).
    ReplaceContent { content: String },

    /// A new timestamp, e.g. after an edit.
    Retimestamp { created_at: DateTime<Utc> },

    /// Fresh classifier output for the message.
    Classified { tag: DomainTag },

    /// Mark the message resolved. Ignored if it already is.
    MarkResolved { at: DateTime<Utc> },

    /// Backend acknowledgement carrying the authoritative timestamp.
    Persisted { created_at: DateTime<Utc> },
}

/// What applying a patch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchEffect {
    pub content_changed: bool,
    pub timestamp_changed: bool,
    pub resolved_changed: bool,
    pub classification_changed: bool,
    pub persisted_changed: bool,
}

impl PatchEffect {
    pub fn is_noop(&self) -> bool {
        !(self.content_changed
            || self.timestamp_changed
            || self.resolved_changed
            || self.classification_changed
            || self.persisted_changed)
    }
}

impl MessagePatch {
    /// Merge this patch into `message` in place.
    pub fn apply(&self, message: &mut Message) -> PatchEffect {
        let mut effect = PatchEffect::default();
        match self {
            Self::AppendChunk { text } => {
                if !text.is_empty() {
                    message.content.push_str(text);
                    effect.content_changed = true;
                }
            }
            Self::ReplaceContent { content } => {
                if message.content != *content {
                    message.content.clone_from(content);
                    effect.content_changed = true;
                }
            }
            Self::Retimestamp { created_at } => {
                effect.timestamp_changed = set_timestamp(message, *created_at);
            }
            Self::Classified { tag } => {
                if message.domain_tag.as_ref() != Some(tag) {
                    message.domain_tag = Some(tag.clone());
                    effect.classification_changed = true;
                }
            }
            Self::MarkResolved { at } => {
                effect.resolved_changed = message.mark_resolved(*at);
            }
            Self::Persisted { created_at } => {
                effect.persisted_changed = !message.persisted;
                message.persisted = true;
                effect.timestamp_changed = set_timestamp(message, *created_at);
            }
        }
        effect
    }

    /// Whether the patch is a streaming chunk.
    pub fn is_stream_chunk(&self) -> bool {
        matches!(self, Self::AppendChunk { .. })
    }
}

fn set_timestamp(message: &mut Message, created_at: DateTime<Utc>) -> bool {
    if message.created_at == created_at {
        return false;
    }
    message.created_at = created_at;
    true
}
