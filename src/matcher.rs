//! Library index and duplicate lookup.
//!
//! The index maps canonical keys (and the ISRC / track URL provenance
//! identities) to the files holding them. It is rebuilt from disk every run
//! and only changes through [`LibraryIndex::insert`] and
//! [`LibraryIndex::remove`]. Lookups are exact; there is no fuzzy matching.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

use crate::models::{CanonicalKey, DuplicateGroup, LibraryEntry, MatchBasis, MatchDecision};
use crate::normalize::{normalize_isrc, normalize_track_url, Normalizer};

// ============================================================================
// Type Aliases
// ============================================================================

/// Index mapping a canonical key to every file carrying it
pub type KeyIndex = FxHashMap<CanonicalKey, Vec<PathBuf>>;

/// Index mapping a normalized provenance identity (ISRC or track URL) to files
pub type IdentityIndex = FxHashMap<String, Vec<PathBuf>>;

// ============================================================================
// Library Index
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    normalizer: Normalizer,
    by_key: KeyIndex,
    by_isrc: IdentityIndex,
    by_url: IdentityIndex,
}

/// Push `path` unless it is already in the set.
fn add_path(files: &mut Vec<PathBuf>, path: &Path) -> bool {
    if files.iter().any(|p| p == path) {
        false
    } else {
        files.push(path.to_path_buf());
        true
    }
}

/// Remove `path` from every set in `index`, dropping emptied sets.
fn remove_path<K: std::hash::Hash + Eq>(index: &mut FxHashMap<K, Vec<PathBuf>>, path: &Path) -> bool {
    let mut removed = false;
    index.retain(|_, files| {
        let before = files.len();
        files.retain(|p| p != path);
        removed |= files.len() != before;
        !files.is_empty()
    });
    removed
}

impl LibraryIndex {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            ..Self::default()
        }
    }

    /// Normalize and insert every entry. Files that normalize to the same key
    /// are all kept; the library may already contain duplicates.
    pub fn build<I, E>(normalizer: Normalizer, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<LibraryEntry>,
    {
        let mut index = Self::new(normalizer);
        for entry in entries {
            index.insert(&entry.into());
        }
        index
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Number of distinct canonical keys
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Add a file. Returns the key it was filed under.
    pub fn insert(&mut self, entry: &LibraryEntry) -> CanonicalKey {
        let key = self.normalizer.normalize_tag(&entry.tag);
        add_path(self.by_key.entry(key.clone()).or_default(), &entry.path);

        if let Some(isrc) = entry.provenance.isrc.as_deref().and_then(normalize_isrc) {
            add_path(self.by_isrc.entry(isrc).or_default(), &entry.path);
        }
        if let Some(url) = entry.provenance.track_url.as_deref().and_then(normalize_track_url) {
            add_path(self.by_url.entry(url).or_default(), &entry.path);
        }
        key
    }

    /// Forget a file (after it was replaced or deleted). Returns whether it
    /// was indexed.
    pub fn remove(&mut self, path: &Path) -> bool {
        let by_key = remove_path(&mut self.by_key, path);
        let by_isrc = remove_path(&mut self.by_isrc, path);
        let by_url = remove_path(&mut self.by_url, path);
        by_key || by_isrc || by_url
    }

    /// Look up a key by exact equality after re-normalizing it. Keys with a
    /// missing artist or title never match: untagged files are not evidence
    /// of anything.
    pub fn find_match(&self, key: &CanonicalKey) -> MatchDecision<'_> {
        let key = self.normalizer.canonicalize(key);
        if !key.is_complete() {
            return MatchDecision::NoMatch;
        }
        match self.by_key.get(&key) {
            Some(files) if !files.is_empty() => MatchDecision::Match {
                basis: MatchBasis::Tags,
                existing: files,
            },
            _ => MatchDecision::NoMatch,
        }
    }

    pub fn find_by_isrc(&self, isrc: &str) -> MatchDecision<'_> {
        lookup_identity(&self.by_isrc, normalize_isrc(isrc), MatchBasis::Isrc)
    }

    pub fn find_by_track_url(&self, url: &str) -> MatchDecision<'_> {
        lookup_identity(&self.by_url, normalize_track_url(url), MatchBasis::TrackUrl)
    }

    /// Match an incoming file by track URL, then ISRC, then tags. The first
    /// identity that hits decides.
    pub fn find_entry_match(&self, entry: &LibraryEntry) -> MatchDecision<'_> {
        if let Some(url) = entry.provenance.track_url.as_deref() {
            let decision = self.find_by_track_url(url);
            if decision.is_match() {
                return decision;
            }
        }
        if let Some(isrc) = entry.provenance.isrc.as_deref() {
            let decision = self.find_by_isrc(isrc);
            if decision.is_match() {
                return decision;
            }
        }
        self.find_match(&self.normalizer.normalize_tag(&entry.tag))
    }

    /// Existing files that conflict with `entry`, excluding the entry's own
    /// path (a file already in the library does not duplicate itself).
    pub fn find_conflicts(&self, entry: &LibraryEntry) -> (Option<MatchBasis>, Vec<PathBuf>) {
        let decision = self.find_entry_match(entry);
        let conflicts = decision.conflicts_excluding(&entry.path);
        match decision {
            MatchDecision::Match { basis, .. } if !conflicts.is_empty() => (Some(basis), conflicts),
            _ => (None, Vec::new()),
        }
    }

    /// Complete keys held by more than one file, sorted by key.
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups: Vec<DuplicateGroup> = self
            .by_key
            .iter()
            .filter(|(key, files)| key.is_complete() && files.len() > 1)
            .map(|(key, files)| DuplicateGroup {
                key: key.clone(),
                files: files.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        groups
    }
}

fn lookup_identity(index: &IdentityIndex, id: Option<String>, basis: MatchBasis) -> MatchDecision<'_> {
    match id.and_then(|id| index.get(&id)) {
        Some(files) if !files.is_empty() => MatchDecision::Match {
            basis,
            existing: files,
        },
        _ => MatchDecision::NoMatch,
    }
}

/// Build an index with the built-in catalog.
pub fn build_index<I, E>(entries: I) -> LibraryIndex
where
    I: IntoIterator<Item = E>,
    E: Into<LibraryEntry>,
{
    LibraryIndex::build(Normalizer::default(), entries)
}

/// Free-function form of [`LibraryIndex::find_match`].
pub fn find_match<'a>(index: &'a LibraryIndex, key: &CanonicalKey) -> MatchDecision<'a> {
    index.find_match(key)
}

// ============================================================================
// Shared Index (concurrent callers)
// ============================================================================

/// Outcome of [`SharedIndex::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// No conflict; the entry is now indexed
    Accepted(CanonicalKey),
    /// Another file already holds this identity; nothing was inserted
    Conflict {
        basis: MatchBasis,
        existing: Vec<PathBuf>,
    },
}

/// Index guarded by a single lock, for callers that accept files from
/// several threads. `claim` checks and inserts in one critical section, so two
/// tracks with the same key can never both be accepted in one run.
#[derive(Debug, Default)]
pub struct SharedIndex {
    inner: Mutex<LibraryIndex>,
}

impl SharedIndex {
    pub fn new(index: LibraryIndex) -> Self {
        Self {
            inner: Mutex::new(index),
        }
    }

    pub fn claim(&self, entry: &LibraryEntry) -> Claim {
        let mut index = self.inner.lock();
        let (basis, existing) = index.find_conflicts(entry);
        match basis {
            Some(basis) => Claim::Conflict { basis, existing },
            None => Claim::Accepted(index.insert(entry)),
        }
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.inner.lock().remove(path)
    }

    /// Run `f` with exclusive access, e.g. to apply a resolution.
    pub fn with_index<R>(&self, f: impl FnOnce(&mut LibraryIndex) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> LibraryIndex {
        self.inner.into_inner()
    }
}
