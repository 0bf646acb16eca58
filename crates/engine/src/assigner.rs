//! Priority assignment — the tier decision table.
//!
//! `assign` maps a message, its conversation and the current instruction to
//! a [`PriorityTier`] plus a diagnostic reason. The first matching rule wins:
//!
//! | # | Applies to | Condition | Tier |
//! |---|------------|-----------|------|
//! | 1 | any | is current instruction | Critical |
//! | 2 | any | classifier excludes it | Low |
//! | 4 | notice + error marker | resolved, recent, relevance > 0.6 | Medium |
//! |   |  | resolved | Low |
//! |   |  | unresolved, relevance > 0.5 or no instruction | High |
//! |   |  | unresolved, otherwise | Medium |
//! | 5 | notice + completion marker | relevance > 0.4 or no instruction | High |
//! |   |  | otherwise | Medium |
//! | 6 | notice, recent | relevance > 0.6 / > 0.4 / otherwise | High / Medium / Medium |
//! | 7 | notice, age > 10 | relevance > 0.7 / otherwise | Medium / Low |
//! | 8 | notice | default | Medium |
//! | 9 | user, recent | relevance > 0.5 or no instruction / otherwise | Medium / Low |
//! | 10 | user, not recent | | Low |
//!
//! "Notice" covers system and assistant messages. Rule 3 computes the
//! factors (recency, age, relevance, resolution) the later rules read.
//! Thresholds and windows are fixed; changing them changes product behaviour.

use std::sync::Arc;

use contextrank_core::classifier::{Classifier, NEUTRAL_RELEVANCE};
use contextrank_core::{AuthorKind, ClassifierError, Message, PriorityTier};
use tracing::{debug, warn};

use crate::lexicon;

/// Messages within this distance of the tail count as recent.
pub const RECENCY_WINDOW: usize = 5;

/// Notices older than this many messages decay.
pub const AGE_THRESHOLD: usize = 10;

/// Relevance used when there is no current instruction to compare against.
pub const DEFAULT_RELEVANCE: f32 = NEUTRAL_RELEVANCE;

pub const RELEVANCE_WEAK: f32 = 0.4;
pub const RELEVANCE_MODERATE: f32 = 0.5;
pub const RELEVANCE_STRONG: f32 = 0.6;
pub const RELEVANCE_DOMINANT: f32 = 0.7;

pub const CURRENT_INSTRUCTION_REASON: &str = "current user instruction";
pub const DEMOTED_INSTRUCTION_REASON: &str = "previous instruction — now supporting context";

/// The rule of the decision table that produced a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    CurrentInstruction,
    Excluded,
    ErrorResolvedRecent,
    ErrorResolved,
    ErrorOpen,
    ErrorOpenLowRelevance,
    GenerationComplete,
    GenerationCompleteLowRelevance,
    RecentStrong,
    RecentModerate,
    RecentWeak,
    AgedRelevant,
    Aged,
    NoticeDefault,
    RecentUser,
    RecentUserLowRelevance,
    StaleUser,
    ClassifierUnavailable,
}

impl Rule {
    pub fn tier(self) -> PriorityTier {
        match self {
            Self::CurrentInstruction => PriorityTier::Critical,
            Self::ErrorOpen | Self::GenerationComplete | Self::RecentStrong => PriorityTier::High,
            Self::ErrorResolvedRecent
            | Self::ErrorOpenLowRelevance
            | Self::GenerationCompleteLowRelevance
            | Self::RecentModerate
            | Self::RecentWeak
            | Self::AgedRelevant
            | Self::NoticeDefault
            | Self::RecentUser => PriorityTier::Medium,
            Self::Excluded
            | Self::ErrorResolved
            | Self::Aged
            | Self::RecentUserLowRelevance
            | Self::StaleUser
            | Self::ClassifierUnavailable => PriorityTier::Low,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::CurrentInstruction => CURRENT_INSTRUCTION_REASON,
            Self::Excluded => "excluded/expired",
            Self::ErrorResolvedRecent => "recently resolved error relevant to current work",
            Self::ErrorResolved => "resolved error",
            Self::ErrorOpen => "unresolved error",
            Self::ErrorOpenLowRelevance => "unresolved error with low relevance",
            Self::GenerationComplete => "generation result for current work",
            Self::GenerationCompleteLowRelevance => "generation result with low relevance",
            Self::RecentStrong => "recent notice, highly relevant",
            Self::RecentModerate => "recent notice, moderately relevant",
            Self::RecentWeak => "recent notice",
            Self::AgedRelevant => "older notice still relevant",
            Self::Aged => "older notice",
            Self::NoticeDefault => "supporting notice",
            Self::RecentUser => "recent user message",
            Self::RecentUserLowRelevance => "recent user message with low relevance",
            Self::StaleUser => "older user message",
            Self::ClassifierUnavailable => "classifier unavailable",
        }
    }
}

/// The factors the decision table reads after rules 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factors {
    /// Distance from the tail of the conversation (0 = newest).
    pub age: usize,
    pub recent: bool,
    pub relevance: f32,
    pub has_current_instruction: bool,
}

impl Factors {
    pub fn new(age: usize, relevance: f32, has_current_instruction: bool) -> Self {
        Self {
            age,
            recent: age < RECENCY_WINDOW,
            relevance,
            has_current_instruction,
        }
    }
}

/// The outcome of ranking one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub tier: PriorityTier,
    pub reason: String,
    pub rule: Rule,
    /// Set when a classifier failure forced the default tier.
    pub degraded: Option<ClassifierError>,
}

impl Assignment {
    fn from_rule(rule: Rule) -> Self {
        Self {
            tier: rule.tier(),
            reason: rule.reason().to_string(),
            rule,
            degraded: None,
        }
    }

    fn degraded(err: ClassifierError) -> Self {
        Self {
            tier: Rule::ClassifierUnavailable.tier(),
            reason: Rule::ClassifierUnavailable.reason().to_string(),
            rule: Rule::ClassifierUnavailable,
            degraded: Some(err),
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.rule == Rule::Excluded
    }
}

/// Rank `message` within `history` (oldest first).
///
/// `age` is the message's distance from the tail of `history`; a message
/// about to be appended has age 0. Never fails: a classifier error yields
/// `Low` with the error recorded.
pub fn assign(
    classifier: &dyn Classifier,
    message: &Message,
    history: &[Arc<Message>],
    age: usize,
    is_current_instruction: bool,
    current_instruction: Option<&Message>,
) -> Assignment {
    if is_current_instruction {
        return Assignment::from_rule(Rule::CurrentInstruction);
    }

    match evaluate(classifier, message, history, age, current_instruction) {
        Ok(rule) => {
            debug!(message_id = %message.id, ?rule, tier = %rule.tier(), "priority assigned");
            Assignment::from_rule(rule)
        }
        Err(err) => {
            warn!(
                message_id = %message.id,
                classifier = classifier.name(),
                error = %err,
                "classifier failed, defaulting to low priority"
            );
            Assignment::degraded(err)
        }
    }
}

fn evaluate(
    classifier: &dyn Classifier,
    message: &Message,
    history: &[Arc<Message>],
    age: usize,
    current_instruction: Option<&Message>,
) -> Result<Rule, ClassifierError> {
    if classifier.should_exclude(message, current_instruction.map(|m| &m.id))? {
        return Ok(Rule::Excluded);
    }

    let anchor = current_instruction.filter(|ci| ci.id != message.id);
    let relevance = match anchor {
        Some(ci) => classifier.relevance(message, ci)?.clamp(0.0, 1.0),
        None => DEFAULT_RELEVANCE,
    };
    let factors = Factors::new(age, relevance, anchor.is_some());

    match message.author {
        AuthorKind::User => Ok(user_rule(&factors)),
        AuthorKind::System | AuthorKind::Assistant => {
            if lexicon::is_error_notice(&message.content) {
                let resolved =
                    message.is_resolved() || classifier.is_error_resolved(message, history)?;
                return Ok(error_rule(&factors, resolved));
            }
            Ok(notice_rule(
                &factors,
                lexicon::is_generation_complete(&message.content),
            ))
        }
    }
}

/// Distance of `idx` from the tail of a history of length `len`.
pub fn age_at(idx: usize, len: usize) -> usize {
    len.saturating_sub(idx + 1)
}

/// Rule 4: notices carrying an error marker.
pub fn error_rule(f: &Factors, resolved: bool) -> Rule {
    if resolved && f.recent && f.relevance > RELEVANCE_STRONG {
        Rule::ErrorResolvedRecent
    } else if resolved {
        Rule::ErrorResolved
    } else if f.relevance > RELEVANCE_MODERATE || !f.has_current_instruction {
        Rule::ErrorOpen
    } else {
        Rule::ErrorOpenLowRelevance
    }
}

/// Rules 5 to 8: notices without an error marker.
pub fn notice_rule(f: &Factors, generation_complete: bool) -> Rule {
    if generation_complete {
        return if f.relevance > RELEVANCE_WEAK || !f.has_current_instruction {
            Rule::GenerationComplete
        } else {
            Rule::GenerationCompleteLowRelevance
        };
    }

    if f.recent {
        if f.relevance > RELEVANCE_STRONG {
            Rule::RecentStrong
        } else if f.relevance > RELEVANCE_WEAK {
            Rule::RecentModerate
        } else {
            Rule::RecentWeak
        }
    } else if f.age > AGE_THRESHOLD {
        if f.relevance > RELEVANCE_DOMINANT {
            Rule::AgedRelevant
        } else {
            Rule::Aged
        }
    } else {
        Rule::NoticeDefault
    }
}

/// Rules 9 and 10: user messages that are not the current instruction.
pub fn user_rule(f: &Factors) -> Rule {
    if !f.recent {
        Rule::StaleUser
    } else if f.relevance > RELEVANCE_MODERATE || !f.has_current_instruction {
        Rule::RecentUser
    } else {
        Rule::RecentUserLowRelevance
    }
}
