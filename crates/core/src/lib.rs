//! # ContextRank Core
//!
//! Domain types, the classifier contract, and error definitions for the
//! ContextRank conversation prioritization engine. The engine crate ranks and
//! resolves messages; this crate only defines what flows through it.
//!
//! ## Design Philosophy
//!
//! Message classification is an external collaborator, defined here as the
//! [`Classifier`] trait. The engine depends on the trait, never on a concrete
//! classifier, so:
//! - Production classifiers can be swapped without touching ranking logic
//! - Tests script classifier answers per message id
//! - Classifier failures stay recoverable values, not panics

pub mod classifier;
pub mod error;
pub mod event;
pub mod group;
pub mod message;
pub mod patch;
pub mod priority;

// Re-export key types at crate root for ergonomics
pub use classifier::{Classifier, Detection, NeutralClassifier, ScriptedClassifier, Signals};
pub use error::{ClassifierError, Error, Result};
pub use event::{EventBus, StoreEvent};
pub use group::{ConversationGroup, GroupId};
pub use message::{AuthorKind, DomainTag, Message, MessageId, ProjectId};
pub use patch::{MessagePatch, PatchEffect};
pub use priority::{PriorityContext, PriorityTier};
