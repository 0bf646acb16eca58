//! Message domain types.
//!
//! A message enters the store optimistically (created locally) or is hydrated
//! from the backend on reload. Its `id` never changes; everything else may be
//! patched through [`MessagePatch`](crate::patch::MessagePatch).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::priority::PriorityContext;

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the project a conversation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Status, progress and error notices
    System,
}

impl std::fmt::Display for AuthorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        };
        f.write_str(label)
    }
}

/// Topic classification attached to a message by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTag {
    /// Coarse domain, e.g. `"auth"` or `"ui"`.
    pub domain: String,

    /// Finer-grained feature tags, e.g. `"login"`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub feature_tags: BTreeSet<String>,
}

impl DomainTag {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            feature_tags: BTreeSet::new(),
        }
    }

    /// Builder-style helper for adding feature tags.
    pub fn with_features<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether two tags describe the same topic.
    ///
    /// Feature tags win when either side has them: the topics match only if
    /// the sets intersect. Without feature tags on both sides, the domains
    /// must be equal.
    pub fn shares_topic_with(&self, other: &DomainTag) -> bool {
        if self.feature_tags.is_empty() && other.feature_tags.is_empty() {
            return !self.domain.is_empty() && self.domain == other.domain;
        }
        !self.feature_tags.is_disjoint(&other.feature_tags)
    }
}

/// A single chat message tied to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// The text content
    pub content: String,

    /// Who sent this message
    pub author: AuthorKind,

    /// Provisional until the backend acknowledges the message.
    pub created_at: DateTime<Utc>,

    /// Whether the backend has acknowledged this message.
    #[serde(default)]
    pub persisted: bool,

    /// Classifier output: topic classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_tag: Option<DomainTag>,

    /// Classifier output: whether the concern has been addressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Assigned by the store; absent until the message is ranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityContext>,
}

impl Message {
    /// Create a new message with a fresh id and a provisional timestamp.
    pub fn new(author: AuthorKind, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            author,
            created_at: Utc::now(),
            persisted: false,
            domain_tag: None,
            resolved: None,
            resolved_at: None,
            priority: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(AuthorKind::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(AuthorKind::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(AuthorKind::System, content)
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = MessageId(id.into());
        self
    }

    /// Override the creation timestamp.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_domain(mut self, tag: DomainTag) -> Self {
        self.domain_tag = Some(tag);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.unwrap_or(false)
    }

    /// Set the resolved flag. Never reverts an already resolved message.
    ///
    /// Returns `true` when the flag actually changed.
    pub fn mark_resolved(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.resolved = Some(true);
        self.resolved_at = Some(at);
        true
    }

    pub fn is_current_instruction(&self) -> bool {
        self.priority
            .as_ref()
            .is_some_and(|p| p.is_current_instruction)
    }
}
