//! Track duplicate detection - shared modules for all binaries.

pub mod matcher;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod resolve;
pub mod rules;
pub mod safety;
pub mod scanner;

pub use matcher::{build_index, find_match, LibraryIndex, SharedIndex};
pub use models::{CanonicalKey, LibraryEntry, MatchDecision, RawTag};
pub use normalize::{normalize, Normalizer};
pub use rules::{RuleCatalog, VersionPolicy};
