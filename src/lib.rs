//! Forest Flow: a session-scoped branching story engine.
//!
//! Walks players through an authored story graph, one session each. Every
//! session carries its own score, sentiment tally and randomized profile,
//! and sees the story through it: illustration prompts, image seeds and
//! choice phrasing are derived deterministically from the session id and
//! the path walked, and calculated endings are picked from the journey's
//! score and sentiment.
//!
//! Start with [`core::pipeline::StoryEngine::builder`].

pub mod core;
pub mod schema;

pub use crate::core::pipeline::{PipelineError, StoryEngine, StoryEngineBuilder};
