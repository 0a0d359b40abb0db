//! Deterministic building blocks shared by the agents and the CLI.
//!
//! Nothing in here calls a model or performs I/O.

pub mod category;
pub mod extract;
pub mod reference;

pub use category::{RequestCategory, ToolCategory};
pub use extract::{DEFAULT_KNOWN_ENTITIES, extract_search_query, match_known_entities};
pub use reference::{DynamicRef, IdExtractor};
