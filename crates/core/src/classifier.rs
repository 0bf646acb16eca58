//! Classifier contract — the black box that reads message text.
//!
//! The engine never inspects topics itself: domain tags, pairwise relevance,
//! error resolution, topic closure and expiry all come from a `Classifier`.
//! Every call is fallible; the engine degrades instead of failing.
//!
//! Implementations: [`NeutralClassifier`] (no signal at all) and
//! [`ScriptedClassifier`] (signals keyed by message id, for replays and tests).
//! Production classifiers live outside this workspace.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::message::{DomainTag, Message, MessageId};

/// Relevance reported when a classifier has nothing better to say.
pub const NEUTRAL_RELEVANCE: f32 = 0.5;

/// Output of [`Classifier::detect_domain`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub tag: DomainTag,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// The classification capabilities the engine consumes.
///
/// Histories are passed oldest first. Calls must be cheap: they run inside
/// the store's mutation lane.
pub trait Classifier: Send + Sync {
    /// The classifier name (for logs).
    fn name(&self) -> &str;

    /// Domain and feature tags, plus whether the message is already resolved.
    fn detect_domain(&self, message: &Message) -> Result<Detection, ClassifierError>;

    /// Relevance of `a` to `b`, in `[0, 1]`.
    fn relevance(&self, a: &Message, b: &Message) -> Result<f32, ClassifierError>;

    /// Whether the message should leave the working set (e.g. an expired retry notice).
    fn should_exclude(
        &self,
        message: &Message,
        current_instruction: Option<&MessageId>,
    ) -> Result<bool, ClassifierError>;

    /// Whether an error notice has since been addressed.
    fn is_error_resolved(
        &self,
        message: &Message,
        history: &[Arc<Message>],
    ) -> Result<bool, ClassifierError>;

    /// Whether the message closes the topic under discussion.
    fn detects_closure(
        &self,
        message: &Message,
        prior: &[Arc<Message>],
    ) -> Result<bool, ClassifierError>;
}

/// A classifier that reports no signal: untagged messages, neutral relevance,
/// nothing resolved, closed or expired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralClassifier;

impl Classifier for NeutralClassifier {
    fn name(&self) -> &str {
        "neutral"
    }

    fn detect_domain(&self, message: &Message) -> Result<Detection, ClassifierError> {
        Ok(Detection {
            tag: message.domain_tag.clone().unwrap_or_default(),
            ..Detection::default()
        })
    }

    fn relevance(&self, _a: &Message, _b: &Message) -> Result<f32, ClassifierError> {
        Ok(NEUTRAL_RELEVANCE)
    }

    fn should_exclude(
        &self,
        _message: &Message,
        _current_instruction: Option<&MessageId>,
    ) -> Result<bool, ClassifierError> {
        Ok(false)
    }

    fn is_error_resolved(
        &self,
        _message: &Message,
        _history: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Ok(false)
    }

    fn detects_closure(
        &self,
        _message: &Message,
        _prior: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Ok(false)
    }
}

/// Per-message signals for a [`ScriptedClassifier`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<DomainTag>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub error_resolved: bool,
    #[serde(default)]
    pub exclude: bool,
    #[serde(default)]
    pub closes_topic: bool,
}

impl Signals {
    pub fn tagged(tag: DomainTag) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn closing(mut self) -> Self {
        self.closes_topic = true;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.exclude = true;
        self
    }

    pub fn error_resolved(mut self) -> Self {
        self.error_resolved = true;
        self
    }
}

/// A classifier whose answers are scripted per message id.
///
/// Unknown messages fall back to their own `domain_tag` and neutral answers.
/// Relevance pairs are symmetric.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    signals: RwLock<HashMap<MessageId, Signals>>,
    relevance: RwLock<HashMap<(MessageId, MessageId), f32>>,
    calls: AtomicU64,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the signals for one message, replacing earlier ones.
    pub fn script(&self, id: impl Into<String>, signals: Signals) {
        self.signals.write().insert(MessageId(id.into()), signals);
    }

    /// Script the relevance between two messages.
    pub fn relate(&self, a: impl Into<String>, b: impl Into<String>, score: f32) {
        let (a, b) = (MessageId(a.into()), MessageId(b.into()));
        let mut table = self.relevance.write();
        table.insert((a.clone(), b.clone()), score.clamp(0.0, 1.0));
        table.insert((b, a), score.clamp(0.0, 1.0));
    }

    /// Total number of classifier calls served.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn signals_for(&self, id: &MessageId) -> Option<Signals> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.signals.read().get(id).cloned()
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect_domain(&self, message: &Message) -> Result<Detection, ClassifierError> {
        let signals = self.signals_for(&message.id).unwrap_or_default();
        let tag = signals
            .tag
            .or_else(|| message.domain_tag.clone())
            .unwrap_or_default();
        Ok(Detection {
            tag,
            resolved: signals.resolved,
            resolved_at: signals.resolved.then_some(message.created_at),
        })
    }

    fn relevance(&self, a: &Message, b: &Message) -> Result<f32, ClassifierError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = (a.id.clone(), b.id.clone());
        Ok(self
            .relevance
            .read()
            .get(&key)
            .copied()
            .unwrap_or(NEUTRAL_RELEVANCE))
    }

    fn should_exclude(
        &self,
        message: &Message,
        _current_instruction: Option<&MessageId>,
    ) -> Result<bool, ClassifierError> {
        Ok(self.signals_for(&message.id).is_some_and(|s| s.exclude))
    }

    fn is_error_resolved(
        &self,
        message: &Message,
        _history: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Ok(self
            .signals_for(&message.id)
            .is_some_and(|s| s.error_resolved))
    }

    fn detects_closure(
        &self,
        message: &Message,
        _prior: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Ok(self
            .signals_for(&message.id)
            .is_some_and(|s| s.closes_topic))
    }
}
