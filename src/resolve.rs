//! Duplicate resolution: skip the new file, keep both, or replace the old one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::matcher::LibraryIndex;
use crate::models::{CanonicalKey, LibraryEntry, MatchBasis};
use crate::safety::validate_replacement;

/// Configured handling for detected duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    /// Ask for every duplicate
    #[default]
    Interactive,
    /// Always skip the incoming file
    Skip,
    /// Always keep both files
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Skip,
    KeepBoth,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Added(CanonicalKey),
    Replaced {
        key: CanonicalKey,
        removed: Vec<PathBuf>,
    },
}

/// "s"/"skip", "k"/"keep", "r"/"replace", case-insensitive.
pub fn parse_choice(input: &str) -> Option<Resolution> {
    match input.trim().to_lowercase().as_str() {
        "s" | "skip" => Some(Resolution::Skip),
        "k" | "keep" => Some(Resolution::KeepBoth),
        "r" | "replace" => Some(Resolution::Replace),
        _ => None,
    }
}

/// Decide what to do with `incoming`, prompting on `input`/`output` in
/// interactive mode. End of input counts as skip.
pub fn decide<R: BufRead, W: Write>(
    handling: DuplicateHandling,
    incoming: &LibraryEntry,
    basis: MatchBasis,
    conflicts: &[PathBuf],
    input: &mut R,
    output: &mut W,
) -> Result<Resolution> {
    match handling {
        DuplicateHandling::Skip => return Ok(Resolution::Skip),
        DuplicateHandling::Keep => return Ok(Resolution::KeepBoth),
        DuplicateHandling::Interactive => {}
    }

    writeln!(output, "\nDuplicate track detected (by {})!", basis)?;
    writeln!(output, "New file: {}", display_name(&incoming.path))?;
    writeln!(output, "  Artist: {}", incoming.tag.artist.as_deref().unwrap_or("<missing>"))?;
    writeln!(output, "  Title: {}", incoming.tag.title.as_deref().unwrap_or("<missing>"))?;
    writeln!(output, "\nExisting files:")?;
    for (i, path) in conflicts.iter().enumerate() {
        writeln!(output, "  {}. {}", i + 1, display_name(path))?;
    }
    writeln!(output, "\nWhat would you like to do?")?;
    writeln!(output, "  [s] Skip new file (keep existing)")?;
    writeln!(output, "  [k] Keep both")?;
    writeln!(output, "  [r] Replace existing with new file")?;

    loop {
        write!(output, "Choice [s/k/r]: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("Failed to read choice")? == 0 {
            writeln!(output)?;
            return Ok(Resolution::Skip);
        }
        match parse_choice(&line) {
            Some(resolution) => return Ok(resolution),
            None => writeln!(output, "Invalid choice. Please enter s, k, or r.")?,
        }
    }
}

/// Carry out a resolution against the index and the filesystem. Replace
/// validates every target before deleting any of them.
pub fn apply(
    index: &mut LibraryIndex,
    resolution: Resolution,
    incoming: &LibraryEntry,
    conflicts: &[PathBuf],
    library_dir: &Path,
) -> Result<Outcome> {
    match resolution {
        Resolution::Skip => Ok(Outcome::Skipped),
        Resolution::KeepBoth => Ok(Outcome::Added(index.insert(incoming))),
        Resolution::Replace => {
            for target in conflicts {
                validate_replacement(target, library_dir, &incoming.path)?;
            }
            let mut removed = Vec::with_capacity(conflicts.len());
            for target in conflicts {
                std::fs::remove_file(target)
                    .with_context(|| format!("Failed to remove {}", target.display()))?;
                index.remove(target);
                removed.push(target.clone());
            }
            Ok(Outcome::Replaced {
                key: index.insert(incoming),
                removed,
            })
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::build_index;
    use crate::models::RawTag;
    use std::fs;
    use std::io::Cursor;

    fn entry(path: &str) -> LibraryEntry {
        LibraryEntry::new(path, RawTag::new(Some("Artist"), Some("Song")))
    }

    fn prompt(handling: DuplicateHandling, answers: &str) -> (Resolution, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let conflicts = vec![PathBuf::from("/lib/Artist - Song.mp3")];
        let resolution = decide(
            handling,
            &entry("/dl/song.m4a"),
            MatchBasis::Tags,
            &conflicts,
            &mut input,
            &mut output,
        )
        .unwrap();
        (resolution, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("s\n"), Some(Resolution::Skip));
        assert_eq!(parse_choice(" K "), Some(Resolution::KeepBoth));
        assert_eq!(parse_choice("replace"), Some(Resolution::Replace));
        assert_eq!(parse_choice("x"), None);
        assert_eq!(parse_choice(""), None);
    }

    #[test]
    fn test_non_interactive_modes() {
        let (resolution, output) = prompt(DuplicateHandling::Skip, "");
        assert_eq!(resolution, Resolution::Skip);
        assert!(output.is_empty());
        assert_eq!(prompt(DuplicateHandling::Keep, "").0, Resolution::KeepBoth);
    }

    #[test]
    fn test_interactive_reprompts() {
        let (resolution, output) = prompt(DuplicateHandling::Interactive, "maybe\nr\n");
        assert_eq!(resolution, Resolution::Replace);
        assert!(output.contains("Artist - Song.mp3"));
        assert!(output.contains("Invalid choice"));
        assert_eq!(output.matches("Choice [s/k/r]").count(), 2);
    }

    #[test]
    fn test_interactive_eof_skips() {
        assert_eq!(prompt(DuplicateHandling::Interactive, "").0, Resolution::Skip);
    }

    #[test]
    fn test_apply_keep_and_skip() {
        let mut index = build_index(vec![entry("/lib/a.mp3")]);
        let incoming = entry("/dl/b.m4a");
        let conflicts = vec![PathBuf::from("/lib/a.mp3")];

        let outcome = apply(&mut index, Resolution::Skip, &incoming, &conflicts, Path::new("/lib")).unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(index.find_entry_match(&incoming).existing().len(), 1);

        let outcome = apply(&mut index, Resolution::KeepBoth, &incoming, &conflicts, Path::new("/lib")).unwrap();
        assert!(matches!(outcome, Outcome::Added(_)));
        assert_eq!(index.find_entry_match(&incoming).existing().len(), 2);
    }

    #[test]
    fn test_apply_replace() {
        let lib = tempfile::tempdir().unwrap();
        let old = lib.path().join("Artist - Song.mp3");
        fs::write(&old, b"old").unwrap();
        let new_path = lib.path().join("Artist - Song.m4a");
        fs::write(&new_path, b"new").unwrap();

        let mut index = build_index(vec![LibraryEntry::new(old.clone(), RawTag::new(Some("Artist"), Some("Song")))]);
        let incoming = LibraryEntry::new(new_path.clone(), RawTag::new(Some("artist"), Some("Song [HD]")));
        let (_, conflicts) = index.find_conflicts(&incoming);
        assert_eq!(conflicts, vec![old.clone()]);

        let outcome = apply(&mut index, Resolution::Replace, &incoming, &conflicts, lib.path()).unwrap();
        match outcome {
            Outcome::Replaced { key, removed } => {
                assert_eq!(key.title, "song");
                assert_eq!(removed, vec![old.clone()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!old.exists());
        assert!(new_path.exists());
        assert_eq!(index.find_entry_match(&incoming).existing(), &[new_path]);
    }

    #[test]
    fn test_replace_refuses_outside_library() {
        let lib = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let old = elsewhere.path().join("Artist - Song.mp3");
        fs::write(&old, b"old").unwrap();

        let mut index = build_index(vec![LibraryEntry::new(old.clone(), RawTag::new(Some("Artist"), Some("Song")))]);
        let incoming = entry("/dl/song.m4a");
        let result = apply(&mut index, Resolution::Replace, &incoming, &[old.clone()], lib.path());
        assert!(result.is_err());
        assert!(old.exists());
        assert!(index.find_entry_match(&incoming).is_match());
    }
}
