//! JSONL transcripts: one store operation per line.
//!
//! ```text
//! {"op":"append","id":"ask","author":"user","content":"Build a login page","signals":{"tag":{"domain":"auth","feature_tags":["login"]}}}
//! {"op":"relate","a":"reply","b":"ask","score":0.9}
//! {"op":"chunk","id":"reply","text":" page"}
//! {"op":"clear"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use contextrank_core::{AuthorKind, Error, Message, MessagePatch, PriorityTier, Result, Signals};
use serde::Deserialize;

/// One transcript operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Record {
    /// Append a message; `signals` script the classifier for it first.
    Append {
        id: String,
        author: AuthorKind,
        content: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
        #[serde(default)]
        signals: Option<Signals>,
    },
    /// Script the relevance between two messages.
    Relate { a: String, b: String, score: f32 },
    Chunk { id: String, text: String },
    Patch { id: String, patch: MessagePatch },
    MarkCurrent { id: String },
    Reassign {
        id: String,
        tier: PriorityTier,
        reason: String,
        #[serde(default)]
        current: bool,
    },
    /// Recompute all tiers, optionally moving the current instruction.
    Recompute {
        #[serde(default)]
        current: Option<String>,
    },
    Clear,
    Hydrate { messages: Vec<Message> },
}

/// A parsed record and its 1-based line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub record: Record,
}

/// Parse a whole transcript, stopping at the first bad line.
pub fn parse(reader: impl BufRead) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    for (idx, raw) in reader.lines().enumerate() {
        let number = idx + 1;
        let raw = raw.map_err(|e| Error::Transcript {
            line: number,
            reason: e.to_string(),
        })?;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|e| Error::Transcript {
            line: number,
            reason: e.to_string(),
        })?;
        lines.push(Line { number, record });
    }
    Ok(lines)
}

/// Build the message for an `append` record.
///
/// Records without a timestamp are placed `number` seconds after `origin`
/// so replays are deterministic.
pub fn message_for(
    id: &str,
    author: AuthorKind,
    content: &str,
    at: Option<DateTime<Utc>>,
    origin: DateTime<Utc>,
    number: usize,
) -> Message {
    let created_at = at.unwrap_or_else(|| origin + chrono::Duration::seconds(number as i64));
    Message::new(author, content).with_id(id).at(created_at)
}
