//! Core data models for duplicate detection.
//!
//! This module contains the tag, key, entry and decision types shared by the
//! normalizer, the library index and the resolution layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Tag Models
// ============================================================================

/// Artist/title pair as read from a file's embedded tags or source metadata.
/// Either field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// Which fields of a [`RawTag`] were absent (or blank).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MissingFields {
    pub artist: bool,
    pub title: bool,
}

impl MissingFields {
    pub fn any(self) -> bool {
        self.artist || self.title
    }
}

impl RawTag {
    pub fn new(artist: Option<&str>, title: Option<&str>) -> Self {
        Self {
            artist: artist.map(str::to_string),
            title: title.map(str::to_string),
        }
    }

    /// Flags used by the review workflow to mark files with missing metadata.
    pub fn missing_fields(&self) -> MissingFields {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        MissingFields {
            artist: blank(&self.artist),
            title: blank(&self.title),
        }
    }
}

/// Normalized (artist, title) pair used as the identity for comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub artist: String,
    pub title: String,
}

impl CanonicalKey {
    /// A key with an empty field came from missing metadata and is never
    /// used to declare a duplicate.
    pub fn is_complete(&self) -> bool {
        !self.artist.is_empty() && !self.title.is_empty()
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

// ============================================================================
// Library Models
// ============================================================================

/// Identity embedded at download time, independent of the tag text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub isrc: Option<String>,
    pub track_url: Option<String>,
}

/// One file in (or about to enter) the library.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub tag: RawTag,
    #[serde(default)]
    pub provenance: Provenance,
}

impl LibraryEntry {
    pub fn new(path: impl Into<PathBuf>, tag: RawTag) -> Self {
        Self {
            path: path.into(),
            tag,
            provenance: Provenance::default(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

impl From<(PathBuf, RawTag)> for LibraryEntry {
    fn from((path, tag): (PathBuf, RawTag)) -> Self {
        LibraryEntry::new(path, tag)
    }
}

impl From<(&str, RawTag)> for LibraryEntry {
    fn from((path, tag): (&str, RawTag)) -> Self {
        LibraryEntry::new(path, tag)
    }
}

// ============================================================================
// Match Models
// ============================================================================

/// Which identity produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    TrackUrl,
    Isrc,
    Tags,
}

impl fmt::Display for MatchBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchBasis::TrackUrl => "track url",
            MatchBasis::Isrc => "isrc",
            MatchBasis::Tags => "artist/title",
        };
        f.write_str(label)
    }
}

/// Result of comparing one incoming track against the library index.
/// Borrowed from the index; consumed immediately by the resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision<'a> {
    NoMatch,
    Match {
        basis: MatchBasis,
        existing: &'a [PathBuf],
    },
}

impl<'a> MatchDecision<'a> {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Match { .. })
    }

    pub fn existing(&self) -> &'a [PathBuf] {
        match self {
            MatchDecision::NoMatch => &[],
            MatchDecision::Match { existing, .. } => existing,
        }
    }

    /// Conflicting files other than `own` (a file already in the library
    /// never conflicts with itself).
    pub fn conflicts_excluding(&self, own: &Path) -> Vec<PathBuf> {
        self.existing()
            .iter()
            .filter(|p| p.as_path() != own)
            .cloned()
            .collect()
    }
}

/// Files sharing one canonical key.
#[derive(Clone, Debug, Serialize)]
pub struct DuplicateGroup {
    pub key: CanonicalKey,
    pub files: Vec<PathBuf>,
}

/// Library files whose tags need attention: missing fields, or junk the
/// normalizer would strip.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetadataReport {
    pub missing: Vec<LibraryEntry>,
    pub junk: Vec<LibraryEntry>,
}

impl MetadataReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.junk.is_empty()
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for a library scan, dumped as JSON like the other phase stats.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ScanStats {
    pub files_found: usize,
    pub files_unreadable: usize,
    pub missing_artist: usize,
    pub missing_title: usize,
    pub distinct_keys: usize,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub elapsed_seconds: f64,
}

impl ScanStats {
    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn record_tag(&mut self, tag: &RawTag) {
        let missing = tag.missing_fields();
        if missing.artist {
            self.missing_artist += 1;
        }
        if missing.title {
            self.missing_title += 1;
        }
    }

    pub fn record_groups(&mut self, groups: &[DuplicateGroup]) {
        self.duplicate_groups = groups.len();
        self.duplicate_files = groups.iter().map(|g| g.files.len()).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields() {
        let tag = RawTag::new(Some("Artist"), None);
        let missing = tag.missing_fields();
        assert!(!missing.artist);
        assert!(missing.title);
        assert!(missing.any());

        let blank = RawTag::new(Some("   "), Some("Song"));
        assert!(blank.missing_fields().artist);
        assert!(!RawTag::new(Some("a"), Some("b")).missing_fields().any());
    }

    #[test]
    fn test_key_completeness() {
        let key = CanonicalKey { artist: "a".into(), title: String::new() };
        assert!(!key.is_complete());
        let key = CanonicalKey { artist: "a".into(), title: "b".into() };
        assert!(key.is_complete());
        assert_eq!(key.to_string(), "a - b");
    }

    #[test]
    fn test_conflicts_excluding_self() {
        let files = vec![PathBuf::from("/lib/a.mp3"), PathBuf::from("/lib/b.m4a")];
        let decision = MatchDecision::Match { basis: MatchBasis::Tags, existing: &files };
        assert_eq!(
            decision.conflicts_excluding(Path::new("/lib/a.mp3")),
            vec![PathBuf::from("/lib/b.m4a")]
        );
        assert!(MatchDecision::NoMatch.conflicts_excluding(Path::new("/x")).is_empty());
    }

    #[test]
    fn test_stats_counts() {
        let mut stats = ScanStats::default();
        stats.record_tag(&RawTag::new(None, Some("t")));
        stats.record_tag(&RawTag::new(Some("a"), None));
        stats.record_tag(&RawTag::default());
        assert_eq!(stats.missing_artist, 2);
        assert_eq!(stats.missing_title, 2);
    }
}
