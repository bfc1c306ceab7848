//! Embedded tag extraction.
//!
//! Reads the artist/title pair and the provenance identities written at
//! download time. Broken or untagged files produce an entry with absent
//! fields instead of an error; the index treats those as missing metadata.

use lofty::error::LoftyError;
use lofty::prelude::{ItemKey, TaggedFileExt};
use lofty::tag::Tag;
use std::path::Path;

use crate::models::{LibraryEntry, MetadataReport, Provenance, RawTag};
use crate::normalize::Normalizer;
use crate::rules::Field;

/// Free-form item name used for the source URL (MP4 `----:com.apple.iTunes:TRACK_URL`,
/// ID3v2 `TXXX:TRACK_URL`, Vorbis `TRACK_URL`).
const TRACK_URL_ITEM: &str = "TRACK_URL";

/// Read tags from `path`, failing if the file cannot be parsed at all.
pub fn read_entry(path: &Path) -> Result<LibraryEntry, LoftyError> {
    let tagged_file = lofty::read_from_path(path)?;

    let entry = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => LibraryEntry::new(path, raw_tag(tag)).with_provenance(provenance(tag)),
        None => LibraryEntry::new(path, RawTag::default()),
    };
    Ok(entry)
}

/// Like [`read_entry`], but an unreadable file yields an entry with no tags.
pub fn read_entry_lossy(path: &Path) -> LibraryEntry {
    read_entry(path).unwrap_or_else(|_| LibraryEntry::new(path, RawTag::default()))
}

/// Sort entries into files with a missing artist or title and files whose
/// tags carry junk. Clean files are left out.
pub fn verify_entries<'a, I>(normalizer: &Normalizer, entries: I) -> MetadataReport
where
    I: IntoIterator<Item = &'a LibraryEntry>,
{
    let mut report = MetadataReport::default();
    for entry in entries {
        if entry.tag.missing_fields().any() {
            report.missing.push(entry.clone());
            continue;
        }
        let artist = entry.tag.artist.as_deref().unwrap_or_default();
        let title = entry.tag.title.as_deref().unwrap_or_default();
        if normalizer.has_junk(artist, Field::Artist) || normalizer.has_junk(title, Field::Title) {
            report.junk.push(entry.clone());
        }
    }
    report
}

fn raw_tag(tag: &Tag) -> RawTag {
    let track_artist = text(tag, &ItemKey::TrackArtist);
    let album_artist = text(tag, &ItemKey::AlbumArtist);
    RawTag {
        artist: track_artist.or(album_artist),
        title: text(tag, &ItemKey::TrackTitle),
    }
}

fn provenance(tag: &Tag) -> Provenance {
    let track_url = tag.items().find_map(|item| match item.key() {
        ItemKey::Unknown(name) if is_track_url_item(name) => item.value().text().and_then(non_blank),
        _ => None,
    });
    Provenance {
        isrc: text(tag, &ItemKey::Isrc),
        track_url,
    }
}

fn is_track_url_item(name: &str) -> bool {
    name.to_ascii_uppercase().ends_with(TRACK_URL_ITEM)
}

fn text(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key).and_then(non_blank)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Minimal FLAC stream: marker, empty STREAMINFO, and a Vorbis comment
    /// block holding `comments` ("KEY=value").
    fn write_flac(path: &Path, comments: &[&str]) {
        let vendor = b"track-dedupe";
        let mut body = Vec::new();
        body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        body.extend_from_slice(vendor);
        body.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            body.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            body.extend_from_slice(comment.as_bytes());
        }

        let mut bytes = b"fLaC".to_vec();
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 34]);
        bytes.extend_from_slice(&[0u8; 34]);
        bytes.push(0x84);
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        bytes.extend_from_slice(&body);
        std::fs::write(path, bytes).unwrap();
    }

    fn tagged(dir: &Path, name: &str, comments: &[&str]) -> PathBuf {
        let path = dir.join(name);
        write_flac(&path, comments);
        path
    }

    #[test]
    fn test_reads_tags_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = tagged(
            dir.path(),
            "song.flac",
            &[
                "ARTIST=The Killers",
                "ALBUMARTIST=Various Artists",
                "TITLE=Mr. Brightside [Official Video]",
                "ISRC=USIR20400274",
                "TRACK_URL=https://open.spotify.com/track/123",
            ],
        );

        let entry = read_entry(&path).unwrap();
        assert_eq!(entry.path, path);
        assert_eq!(entry.tag.artist.as_deref(), Some("The Killers"));
        assert_eq!(entry.tag.title.as_deref(), Some("Mr. Brightside [Official Video]"));
        assert_eq!(entry.provenance.isrc.as_deref(), Some("USIR20400274"));
        assert_eq!(
            entry.provenance.track_url.as_deref(),
            Some("https://open.spotify.com/track/123")
        );
    }

    #[test]
    fn test_album_artist_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = tagged(dir.path(), "song.flac", &["ALBUMARTIST=Daft Punk", "TITLE=One More Time"]);

        let entry = read_entry(&path).unwrap();
        assert_eq!(entry.tag.artist.as_deref(), Some("Daft Punk"));
        assert_eq!(entry.tag.title.as_deref(), Some("One More Time"));
        assert_eq!(entry.provenance, Provenance::default());
    }

    #[test]
    fn test_blank_values_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = tagged(dir.path(), "song.flac", &["ARTIST=  ", "TITLE=Song", "TRACK_URL="]);

        let entry = read_entry(&path).unwrap();
        assert!(entry.tag.missing_fields().artist);
        assert!(!entry.tag.missing_fields().title);
        assert_eq!(entry.provenance.track_url, None);
    }

    #[test]
    fn test_verify_entries() {
        let entries = vec![
            LibraryEntry::new("/lib/clean.m4a", RawTag::new(Some("Artist"), Some("Song (Live)"))),
            LibraryEntry::new("/lib/junk.m4a", RawTag::new(Some("Artist"), Some("Song [Official Video]"))),
            LibraryEntry::new("/lib/topic.m4a", RawTag::new(Some("Artist - Topic"), Some("Song"))),
            LibraryEntry::new("/lib/untagged.m4a", RawTag::new(None, Some("Song [HD]"))),
        ];

        let report = verify_entries(&Normalizer::default(), &entries);
        let paths = |list: &[LibraryEntry]| list.iter().map(|e| e.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&report.missing), vec![PathBuf::from("/lib/untagged.m4a")]);
        assert_eq!(
            paths(&report.junk),
            vec![PathBuf::from("/lib/junk.m4a"), PathBuf::from("/lib/topic.m4a")]
        );
        assert!(!report.is_clean());
        assert!(verify_entries(&Normalizer::default(), &entries[..1]).is_clean());
    }

    #[test]
    fn test_track_url_item_names() {
        assert!(is_track_url_item("----:com.apple.iTunes:TRACK_URL"));
        assert!(is_track_url_item("TRACK_URL"));
        assert!(is_track_url_item("track_url"));
        assert!(!is_track_url_item("TRACK_URLS"));
        assert!(!is_track_url_item("PLAYLIST_URL"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  Song "), Some("Song".to_string()));
        assert_eq!(non_blank("   "), None);
    }

    #[test]
    fn test_unreadable_file_is_untagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"this is not audio")
            .unwrap();

        let entry = read_entry_lossy(&path);
        assert_eq!(entry.path, path);
        assert_eq!(entry.tag, RawTag::default());
        assert_eq!(entry.provenance, Provenance::default());
    }

    #[test]
    fn test_missing_file_is_untagged() {
        let entry = read_entry_lossy(Path::new("/definitely/not/here.m4a"));
        assert!(entry.tag.missing_fields().artist);
        assert!(entry.tag.missing_fields().title);
    }
}
