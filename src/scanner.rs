//! Library directory scanning.
//!
//! Phase 1 walks the directory for audio files, phase 2 reads their tags in
//! parallel. Index building is left to the caller, on one thread.

use anyhow::{bail, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::metadata::read_entry;
use crate::models::{LibraryEntry, RawTag, ScanStats};
use crate::progress::PhaseProgress;

/// Extensions the downloaders produce or users commonly keep.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "ogg", "opus", "wav", "aac"];

const LOG_INTERVAL: u64 = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Descend into subdirectories; the output directory is flat by default.
    pub recursive: bool,
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Audio files under `dir`, sorted.
pub fn collect_audio_files(dir: &Path, options: ScanOptions) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Library directory not found: {}", dir.display());
    }

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Read every audio file's tags. Unreadable files come back untagged and are
/// counted in `stats.files_unreadable`.
pub fn scan_library(dir: &Path, options: ScanOptions, stats: &mut ScanStats) -> Result<Vec<LibraryEntry>> {
    let start = Instant::now();

    let walking = PhaseProgress::walking("Phase 1: Finding audio files");
    let files = collect_audio_files(dir, options)?;
    walking.finish(format!("Phase 1: Found {} audio files in {}", files.len(), dir.display()));

    let reading = PhaseProgress::files("Phase 2: Reading tags", files.len() as u64, LOG_INTERVAL);
    let results: Vec<(LibraryEntry, bool)> = files
        .par_iter()
        .map(|path| {
            let result = match read_entry(path) {
                Ok(entry) => (entry, true),
                Err(_) => (LibraryEntry::new(path.as_path(), RawTag::default()), false),
            };
            reading.tick();
            result
        })
        .collect();

    stats.files_found += results.len();
    let mut entries = Vec::with_capacity(results.len());
    for (entry, readable) in results {
        if !readable {
            stats.files_unreadable += 1;
        }
        stats.record_tag(&entry.tag);
        entries.push(entry);
    }
    reading.finish(format!("Phase 2: Read tags from {} files", entries.len()));

    stats.elapsed_seconds += start.elapsed().as_secs_f64();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a.mp3")));
        assert!(is_audio_file(Path::new("a.M4A")));
        assert!(is_audio_file(Path::new("/x/y/Artist - Song.flac")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("mp3")));
    }

    #[test]
    fn test_collect_flat_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mp3"));
        touch(&dir.path().join("a.M4A"));
        touch(&dir.path().join("notes.txt"));
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub").join("c.flac"));

        let flat = collect_audio_files(dir.path(), ScanOptions::default()).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.M4A"), dir.path().join("b.mp3")]);

        let deep = collect_audio_files(dir.path(), ScanOptions { recursive: true }).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("sub").join("c.flac")));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_audio_files(&dir.path().join("nope"), ScanOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_scan_tolerates_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("empty.mp3"));
        touch(&dir.path().join("empty.m4a"));

        let mut stats = ScanStats::default();
        let entries = scan_library(dir.path(), ScanOptions::default(), &mut stats).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(stats.files_found, 2);
        assert_eq!(stats.missing_artist, 2);
        assert_eq!(stats.missing_title, 2);
        assert!(entries.iter().all(|e| e.tag == RawTag::default()));
    }
}
