//! Safety checks before deleting library files.
//!
//! "Replace" is the only resolution that deletes anything. These checks make
//! sure the file about to go is an audio file inside the library and is not
//! the file we are trying to keep.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::scanner::is_audio_file;

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Cannot resolve '{}'", path.display()))
}

/// Validates that `target` may be deleted to make room for `incoming`.
///
/// Checks:
/// - `target` exists and is an audio file
/// - `target` lives inside `library_dir`
/// - `target` is not the incoming file itself
///
/// # Returns
/// * `Ok(())` if the target is safe to delete
/// * `Err` with a descriptive message if any check fails
pub fn validate_replacement(target: &Path, library_dir: &Path, incoming: &Path) -> Result<()> {
    if !is_audio_file(target) {
        bail!(
            "Safety check failed: '{}' is not an audio file",
            target.display()
        );
    }

    let target_real = resolve(target)?;
    let library_real = resolve(library_dir)?;

    if !target_real.starts_with(&library_real) {
        bail!(
            "Safety check failed: '{}' is outside the library '{}'",
            target.display(),
            library_dir.display()
        );
    }

    if let Ok(incoming_real) = incoming.canonicalize() {
        if incoming_real == target_real {
            bail!(
                "Safety check failed: '{}' is the incoming file and cannot be replaced by itself",
                target.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_valid_replacement() {
        let lib = tempfile::tempdir().unwrap();
        let dl = tempfile::tempdir().unwrap();
        let target = lib.path().join("old.mp3");
        let incoming = dl.path().join("new.m4a");
        fs::write(&target, b"").unwrap();
        fs::write(&incoming, b"").unwrap();
        assert!(validate_replacement(&target, lib.path(), &incoming).is_ok());
    }

    #[test]
    fn test_outside_library() {
        let lib = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let target = other.path().join("old.mp3");
        fs::write(&target, b"").unwrap();
        let result = validate_replacement(&target, lib.path(), Path::new("/nowhere/new.m4a"));
        assert!(result.unwrap_err().to_string().contains("outside the library"));
    }

    #[test]
    fn test_same_as_incoming() {
        let lib = tempfile::tempdir().unwrap();
        let target = lib.path().join("song.m4a");
        fs::write(&target, b"").unwrap();
        let result = validate_replacement(&target, lib.path(), &target);
        assert!(result.unwrap_err().to_string().contains("replaced by itself"));
    }

    #[test]
    fn test_not_audio() {
        let lib = tempfile::tempdir().unwrap();
        let target = lib.path().join("cover.jpg");
        fs::write(&target, b"").unwrap();
        let result = validate_replacement(&target, lib.path(), Path::new("x.mp3"));
        assert!(result.unwrap_err().to_string().contains("not an audio file"));
    }

    #[test]
    fn test_missing_target() {
        let lib = tempfile::tempdir().unwrap();
        let result = validate_replacement(&lib.path().join("gone.mp3"), lib.path(), Path::new("x.mp3"));
        assert!(result.is_err());
    }
}
