//! Publisher name resolution.
//!
//! Documents spell the same publisher in many ways ("O'Reilly Media, Inc.",
//! "O'Reilly & Associates", "oreilly"). The [`Resolver`] maps each distinct
//! raw spelling to a canonical name exactly once per run: from the
//! persistent cache if it has been seen before, from the keyword
//! [`RuleTable`] if a rule matches, and otherwise, when configured, by asking
//! an external [`Normalizer`] in chunks.

pub mod error;
mod normalizer;
mod openai;
mod resolver;
mod rules;

pub use crate::normalizer::Normalizer;
pub use crate::openai::{DEFAULT_PROMPT, OpenAiNormalizer};
pub use crate::resolver::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IN_FLIGHT, Resolution, ResolutionStats, Resolver};
pub use crate::rules::{Rule, RuleTable};
