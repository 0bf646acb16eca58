//! Conversation groups: an ask, its answer, and the follow-ons.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::MessageId;

/// Unique identifier for a conversation group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of messages treated as one logical exchange, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationGroup {
    pub id: GroupId,
    message_ids: Vec<MessageId>,
}

impl ConversationGroup {
    /// Open a new group anchored on `first`.
    pub fn open(first: MessageId) -> Self {
        Self {
            id: GroupId::new(),
            message_ids: vec![first],
        }
    }

    /// Add a member. Ids already present are ignored.
    pub fn push(&mut self, id: MessageId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.message_ids.push(id);
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.message_ids.contains(id)
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }

    /// The message that opened the group.
    pub fn anchor(&self) -> Option<&MessageId> {
        self.message_ids.first()
    }

    pub fn len(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_is_an_ordered_set() {
        let mut group = ConversationGroup::open(MessageId::from("ask"));
        assert!(group.push(MessageId::from("answer")));
        assert!(!group.push(MessageId::from("ask")));
        assert_eq!(group.len(), 2);
        assert_eq!(group.anchor(), Some(&MessageId::from("ask")));
        assert_eq!(
            group.message_ids(),
            &[MessageId::from("ask"), MessageId::from("answer")]
        );
    }
}
