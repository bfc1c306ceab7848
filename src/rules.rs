//! Rule catalog for title/artist canonicalization.
//!
//! The catalog is data: an ordered list of [`JunkRule`] records plus the list
//! of preserved version markers and the policy deciding what happens to them.
//! It can be dumped to and loaded from JSON, so a library with different
//! needs can swap rules without touching code.
//!
//! Ordering matters. Featuring rewrites run before any deletion, otherwise a
//! broad bracket rule could eat a `(feat. X)` clause. [`RuleCatalog::compile`]
//! rejects catalogs that break this.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Rule Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Rewrites "ft"/"feat"/"featuring" variants to one spelling
    Featuring,
    /// Official video/audio, lyrics, download and release promos
    Promotional,
    /// Channel suffixes and platform markers
    Platform,
    /// Resolution and quality markers
    Quality,
    /// Content-distinguishing markers (live, remix, ...). Only valid as a
    /// deletion under [`VersionPolicy::Strip`].
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
    Delete,
    /// Replacement text; `${1}` style capture references are expanded.
    Rewrite { replacement: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    Title,
    Artist,
    Both,
}

/// Field of a tag a rule is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Artist,
    Title,
}

impl RuleScope {
    pub fn applies_to(self, field: Field) -> bool {
        matches!(
            (self, field),
            (RuleScope::Both, _) | (RuleScope::Title, Field::Title) | (RuleScope::Artist, Field::Artist)
        )
    }
}

/// What to do with preserved version markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// DJ library: "Song (Live)" and "Song" are different tracks.
    #[default]
    Preserve,
    /// General library: bracketed version markers are junk too.
    Strip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunkRule {
    pub name: String,
    pub pattern: String,
    pub category: RuleCategory,
    pub action: RuleAction,
    #[serde(default)]
    pub scope: RuleScope,
}

impl JunkRule {
    fn delete(name: &str, pattern: &str, category: RuleCategory, scope: RuleScope) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category,
            action: RuleAction::Delete,
            scope,
        }
    }

    fn rewrite(name: &str, pattern: &str, replacement: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category: RuleCategory::Featuring,
            action: RuleAction::Rewrite {
                replacement: replacement.to_string(),
            },
            scope: RuleScope::Both,
        }
    }
}

// ============================================================================
// Built-in Catalog
// ============================================================================

/// Bracketed span that never crosses another bracket, so "(Live) (Video)"
/// is two spans and the video rule cannot swallow the live tag.
macro_rules! bracketed {
    ($inner:literal) => {
        concat!(r"[\(\[][^\(\)\[\]]*?", $inner, r"[^\(\)\[\]]*?[\)\]]")
    };
}

/// Junk rules, applied in order after the featuring rewrites.
const BUILTIN_JUNK: &[(&str, &str, RuleCategory, RuleScope)] = &[
    // Official/video/audio: "[Official Music Video]", "(Lyric Video)", "(Audio)"
    ("official-tag", r"[\(\[]\s*official\b[^\(\)\[\]]*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    ("video-tag", bracketed!("video"), RuleCategory::Promotional, RuleScope::Title),
    ("audio-tag", bracketed!("audio"), RuleCategory::Promotional, RuleScope::Title),
    // Lyrics/visualizer: "[Lyrics]", "[Visualiser]"
    ("lyrics-tag", bracketed!("lyric"), RuleCategory::Promotional, RuleScope::Title),
    ("visualizer-tag", r"[\(\[]\s*visuali[sz]er[^\(\)\[\]]*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    // Quality/resolution: "[HD]", "[4K]", "(High Quality)"
    ("resolution-tag", r"[\(\[]\s*(?:hd|4k|8k|uhd|hq|lq)\s*[\)\]]", RuleCategory::Quality, RuleScope::Title),
    ("quality-tag", bracketed!("quality"), RuleCategory::Quality, RuleScope::Title),
    // Platform: YouTube auto-generated "Artist - Topic" channels, "[Premium]"
    ("topic-suffix", r"\s*-\s*topic\s*$", RuleCategory::Platform, RuleScope::Both),
    ("premium-tag", r"[\(\[]\s*premium\s*[\)\]]", RuleCategory::Platform, RuleScope::Title),
    // Promotional: "[Free Download]", "[Out Now]", "[NEW]"
    ("free-download-tag", r"[\(\[]\s*free\s*download\s*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    ("download-tag", r"[\(\[]\s*download[^\(\)\[\]]*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    ("out-now-tag", r"[\(\[]\s*out\s*now\s*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    ("new-tag", r"[\(\[]\s*new\s*[\)\]]", RuleCategory::Promotional, RuleScope::Title),
    // Unbracketed phrases: "Song - Official Video", "Song Music Video"
    ("official-video-phrase", r"\bofficial\s+(?:music\s+)?video\b", RuleCategory::Promotional, RuleScope::Title),
    ("official-audio-phrase", r"\bofficial\s+audio\b", RuleCategory::Promotional, RuleScope::Title),
    ("music-video-phrase", r"\bmusic\s+video\b", RuleCategory::Promotional, RuleScope::Title),
];

/// Markers of a musically distinct version. Two recordings that differ only
/// by one of these are not duplicates in a DJ library.
const BUILTIN_PRESERVED: &[&str] = &[
    "live",
    "remix",
    "acoustic",
    "instrumental",
    "radio edit",
    "extended edit",
    "extended mix",
    "bootleg",
    "mashup",
    "explicit",
    "clean",
    "remaster",
    "remastered",
    "session",
    "sessions",
    "unplugged",
    "spotify singles",
    "tiny desk",
];

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalog {
    pub rules: Vec<JunkRule>,
    #[serde(default)]
    pub preserved: Vec<String>,
    #[serde(default)]
    pub policy: VersionPolicy,
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleCatalog {
    pub fn builtin() -> Self {
        let mut rules = vec![
            // "(feat. X)", "[ft X]", "(featuring X)" → " feat. X"
            JunkRule::rewrite(
                "feat-bracketed",
                r"\s*[\(\[]\s*(?:ft|feat|featuring)\b\.?\s*([^\(\)\[\]]+?)\s*[\)\]]",
                " feat. ${1}",
            ),
            // "Song ft X", "Song feat. X", "Song (featuring X" → "Song feat. X"
            JunkRule::rewrite(
                "feat-inline",
                r"(?:\(\s*|\s+)(?:ft|feat|featuring)\b\.?\s+",
                " feat. ",
            ),
        ];
        rules.extend(
            BUILTIN_JUNK
                .iter()
                .map(|&(name, pattern, category, scope)| JunkRule::delete(name, pattern, category, scope)),
        );

        Self {
            rules,
            preserved: BUILTIN_PRESERVED.iter().map(|m| m.to_string()).collect(),
            policy: VersionPolicy::Preserve,
        }
    }

    pub fn with_policy(mut self, policy: VersionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse rule catalog")
    }

    /// Load a catalog file written by `track-dedupe rules` (or by hand).
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule catalog {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid rule catalog {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate ordering and categories and compile every pattern.
    ///
    /// Under [`VersionPolicy::Strip`] one extra deletion rule built from the
    /// preserved markers is appended after the catalog's own rules.
    pub fn compile(&self) -> Result<Vec<CompiledRule>> {
        let mut compiled = Vec::with_capacity(self.rules.len() + 1);
        let mut first_deletion: Option<&str> = None;

        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                bail!("Rule catalog contains a rule without a name");
            }
            match (&rule.action, rule.category) {
                (RuleAction::Rewrite { .. }, _) => {
                    if let Some(earlier) = first_deletion {
                        bail!(
                            "Rule '{}' rewrites text but is listed after deletion rule '{}'; rewrites must come first",
                            rule.name,
                            earlier
                        );
                    }
                }
                (RuleAction::Delete, RuleCategory::Featuring) => {
                    bail!("Rule '{}' is a featuring rule and must rewrite, not delete", rule.name);
                }
                (RuleAction::Delete, RuleCategory::Version) if self.policy == VersionPolicy::Preserve => {
                    bail!(
                        "Rule '{}' deletes a version marker, which the preserve policy forbids",
                        rule.name
                    );
                }
                (RuleAction::Delete, _) => {
                    first_deletion.get_or_insert(rule.name.as_str());
                }
            }
            compiled.push(CompiledRule::new(rule)?);
        }

        if self.policy == VersionPolicy::Strip {
            if let Some(alternation) = marker_alternation(&self.preserved) {
                let rule = JunkRule::delete(
                    "version-markers",
                    &format!(r"[\(\[][^\(\)\[\]]*?\b(?:{})\b[^\(\)\[\]]*?[\)\]]", alternation),
                    RuleCategory::Version,
                    RuleScope::Title,
                );
                compiled.push(CompiledRule::new(&rule)?);
            }
        }

        Ok(compiled)
    }

    /// Regex matching any preserved marker as a whole word. Under the
    /// preserve policy a junk match containing one of these is left alone.
    pub fn preserve_guard(&self) -> Result<Option<Regex>> {
        if self.policy == VersionPolicy::Strip {
            return Ok(None);
        }
        marker_alternation(&self.preserved)
            .map(|alt| {
                Regex::new(&format!(r"(?i)\b(?:{})\b", alt))
                    .context("Failed to compile preserved marker list")
            })
            .transpose()
    }
}

/// `live|radio\s+edit|...`, or `None` for an empty list.
fn marker_alternation(markers: &[String]) -> Option<String> {
    let parts: Vec<String> = markers
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|m| {
            m.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("|"))
    }
}

// ============================================================================
// Compiled Rules
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub category: RuleCategory,
    pub action: RuleAction,
    pub scope: RuleScope,
    pub regex: Regex,
}

impl CompiledRule {
    fn new(rule: &JunkRule) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", rule.pattern))
            .with_context(|| format!("Rule '{}' has an invalid pattern", rule.name))?;
        Ok(Self {
            name: rule.name.clone(),
            category: rule.category,
            action: rule.action.clone(),
            scope: rule.scope,
            regex,
        })
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self.action, RuleAction::Rewrite { .. })
    }
}
