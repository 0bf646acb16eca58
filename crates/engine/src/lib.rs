//! The ContextRank engine.
//!
//! Ranks every message of a project conversation into a [`PriorityTier`]
//! so that prompt assembly can keep what matters and drop what does not:
//!
//! 1. **Assign** a tier per message from a fixed decision table
//!    ([`assigner`]), driven by classifier signals and recency
//! 2. **Resolve** earlier messages when a new one closes their topic
//!    ([`resolution`])
//! 3. **Store** the authoritative per-project table with a single writer
//!    and snapshot readers ([`store`])
//! 4. **Fit** the ordered view into a token budget ([`window`])
//!
//! [`PriorityTier`]: contextrank_core::PriorityTier

pub mod assigner;
pub mod cache;
pub mod files;
pub mod lexicon;
pub mod resolution;
pub mod store;
pub mod token;
pub mod window;

pub use assigner::{Assignment, Factors, Rule, assign};
pub use cache::{CacheStats, CachedClassifier};
pub use files::extract_file_references;
pub use store::{
    ConversationStore, HydrateReport, ProjectConversation, StatsSnapshot, StoreOptions,
};
pub use window::{ContextWindow, ContextWindowBuilder, WindowBudget, WindowStats};
