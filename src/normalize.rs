//! Title/artist canonicalization for duplicate detection.
//!
//! CRITICAL: the library index, the `check` command and the simulate binary
//! all compare keys produced here. Any change to the pipeline changes which
//! files count as duplicates. Run tests after changes.
//!
//! Pipeline per field: prepare (NFC, lower-case, whitespace) → featuring
//! rewrites → junk deletions → tidy, repeated until the text stops changing.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::models::{CanonicalKey, RawTag};
use crate::rules::{CompiledRule, Field, RuleAction, RuleCatalog, VersionPolicy};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Regex to collapse any whitespace run into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Bracket pairs emptied by a deletion: "()", "[ ]"
pub static EMPTY_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]").unwrap());

/// Padding just inside brackets: "( live )" → "(live)"
pub static OPEN_PADDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\(\[])\s+").unwrap());
pub static CLOSE_PADDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([\)\]])").unwrap());

/// Separators orphaned at either end by a deletion: "song - [official video]" → "song -"
pub static EDGE_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\-–—|:,/]+|[\s\-–—|:,/]+$").unwrap());

/// Separator runs left in the middle by a deletion: "song - - remix" → "song - remix"
pub static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([\-–—|:,/])(?:\s*[\-–—|:,/])+\s*").unwrap());

/// Upper bound on pipeline passes; real titles settle in two or three.
const MAX_PASSES: usize = 16;

/// Normalizer built from the built-in catalog.
pub static DEFAULT_NORMALIZER: Lazy<Normalizer> =
    Lazy::new(|| Normalizer::new(&RuleCatalog::builtin()).expect("built-in rule catalog compiles"));

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// NFC-compose, turn control characters (ID3 NUL padding, stray tabs) into
/// spaces, lower-case, collapse whitespace and trim.
pub fn prepare(text: &str) -> String {
    let composed: String = text
        .nfc()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let lowered: String = composed.to_lowercase().nfc().collect();
    MULTI_SPACE.replace_all(&lowered, " ").trim().to_string()
}

/// Clean up what a deletion leaves behind. Separator trimming only runs after
/// a deletion so names like "+/-" survive untouched.
pub fn tidy(text: &str, after_deletion: bool) -> String {
    let mut result = EMPTY_BRACKETS.replace_all(text, " ").into_owned();
    result = OPEN_PADDING.replace_all(&result, "$1").into_owned();
    result = CLOSE_PADDING.replace_all(&result, "$1").into_owned();
    result = MULTI_SPACE.replace_all(&result, " ").trim().to_string();
    if after_deletion {
        result = SEPARATOR_RUN.replace_all(&result, " $1 ").into_owned();
        result = EDGE_SEPARATORS.replace_all(&result, "").into_owned();
        result = MULTI_SPACE.replace_all(&result, " ").trim().to_string();
    }
    result
}

/// Canonical ISRC: no spaces or hyphens, upper-case. Blank → `None`.
pub fn normalize_isrc(isrc: &str) -> Option<String> {
    let compact: String = isrc
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();
    (!compact.is_empty()).then_some(compact)
}

/// Canonical source URL: query and fragment dropped, trailing slashes dropped,
/// lower-case. "https://open.spotify.com/track/123/?si=abc" and
/// "https://open.spotify.com/track/123" are the same track.
pub fn normalize_track_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_query = trimmed
        .find(['?', '#'])
        .map_or(trimmed, |idx| &trimmed[..idx]);
    let canonical = without_query.trim_end_matches('/').to_lowercase();
    (!canonical.is_empty()).then_some(canonical)
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Compiled rule catalog. Cheap to clone (compiled regexes are shared).
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<CompiledRule>,
    guard: Option<Regex>,
    policy: VersionPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        DEFAULT_NORMALIZER.clone()
    }
}

impl Normalizer {
    pub fn new(catalog: &RuleCatalog) -> Result<Self> {
        Ok(Self {
            rules: catalog.compile()?,
            guard: catalog.preserve_guard()?,
            policy: catalog.policy,
        })
    }

    pub fn policy(&self) -> VersionPolicy {
        self.policy
    }

    /// Canonical key for a raw (artist, title) pair. Absent fields normalize
    /// to empty strings; this never fails.
    pub fn normalize(&self, artist: Option<&str>, title: Option<&str>) -> CanonicalKey {
        CanonicalKey {
            artist: self.normalize_field(artist.unwrap_or(""), Field::Artist),
            title: self.normalize_field(title.unwrap_or(""), Field::Title),
        }
    }

    pub fn normalize_tag(&self, tag: &RawTag) -> CanonicalKey {
        self.normalize(tag.artist.as_deref(), tag.title.as_deref())
    }

    /// Re-normalize a key. A key this normalizer produced comes back unchanged.
    pub fn canonicalize(&self, key: &CanonicalKey) -> CanonicalKey {
        self.normalize(Some(&key.artist), Some(&key.title))
    }

    /// Run the full pipeline on one field.
    ///
    /// If deletions would empty a field that had text after the featuring
    /// rewrite, the rewritten (un-stripped) text is returned instead: a title
    /// made only of junk markers must not collide with every other such title.
    /// Text that is nothing but empty brackets falls back to its prepared form.
    pub fn normalize_field(&self, text: &str, field: Field) -> String {
        let prepared = prepare(text);
        if prepared.is_empty() {
            return prepared;
        }

        let rewritten = self.settle(prepared.clone(), |s| self.rewrite(s, field));

        let stripped = self.settle(rewritten.clone(), |s| {
            let (deleted_text, deleted) = self.strip(s, field);
            self.rewrite(&tidy(&deleted_text, deleted), field)
        });

        [stripped, rewritten]
            .into_iter()
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(prepared)
    }

    /// Whether `text` carries anything the junk rules for `field` would
    /// delete. Preserved markers do not count.
    pub fn has_junk(&self, text: &str, field: Field) -> bool {
        let prepared = prepare(text);
        if prepared.is_empty() {
            return false;
        }
        let rewritten = self.settle(prepared, |s| self.rewrite(s, field));
        self.strip(&rewritten, field).1
    }

    /// Apply `step` until the text stops changing.
    fn settle(&self, mut current: String, step: impl Fn(&str) -> String) -> String {
        for _ in 0..MAX_PASSES {
            let next = step(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Featuring rewrites for `field`, followed by whitespace cleanup.
    fn rewrite(&self, text: &str, field: Field) -> String {
        let mut result = text.to_string();
        for rule in self.rules.iter().filter(|r| r.scope.applies_to(field)) {
            if let RuleAction::Rewrite { replacement } = &rule.action {
                result = rule.regex.replace_all(&result, replacement.as_str()).into_owned();
            }
        }
        tidy(&result, false)
    }

    /// Junk deletions for `field`. Returns the text and whether anything was
    /// removed. A match that contains a preserved marker is kept as-is.
    fn strip(&self, text: &str, field: Field) -> (String, bool) {
        let mut result = text.to_string();
        let mut deleted = false;

        for rule in self.rules.iter().filter(|r| !r.is_rewrite() && r.scope.applies_to(field)) {
            let next = rule
                .regex
                .replace_all(&result, |caps: &Captures| {
                    let span = &caps[0];
                    match &self.guard {
                        Some(guard) if guard.is_match(span) => span.to_string(),
                        _ => String::new(),
                    }
                })
                .into_owned();
            if next != result {
                deleted = true;
                result = next;
            }
        }

        (result, deleted)
    }
}

/// Canonical key using the built-in catalog.
pub fn normalize(artist: Option<&str>, title: Option<&str>) -> CanonicalKey {
    DEFAULT_NORMALIZER.normalize(artist, title)
}

/// Canonical title using the built-in catalog.
pub fn normalize_title(title: &str) -> String {
    DEFAULT_NORMALIZER.normalize_field(title, Field::Title)
}

/// Canonical artist using the built-in catalog.
pub fn normalize_artist(artist: &str) -> String {
    DEFAULT_NORMALIZER.normalize_field(artist, Field::Artist)
}

// ============================================================================
// TESTS
// ============================================================================
