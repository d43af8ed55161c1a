//! Deterministic output file names for tracks.
//!
//! The name is the only deduplication key: two playlist rows map to the same
//! file exactly when their sanitized `artist - title` strings are equal.
//! Spelling differences (punctuation, featuring credits) produce distinct files.
//! Names too long for the filesystem are shortened and tagged with a digest of
//! the full name, so shortening never merges two tracks.

use super::track::TrackDescriptor;

pub const OUTPUT_EXTENSION: &str = "mp3";

/// Characters rejected by at least one common filesystem
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum stem length in bytes, leaving room for the extension.
const MAX_STEM_BYTES: usize = 200;

/// Hex digits of the full-name digest appended to shortened stems
const DIGEST_LEN: usize = 8;

/// Returns the file name (with extension) a track is stored under.
pub fn canonical_file_name(track: &TrackDescriptor) -> String {
    format!(
        "{}.{OUTPUT_EXTENSION}",
        canonical_stem(&track.artist, &track.title)
    )
}

/// Lower-cased, whitespace-normalized and filesystem-safe `artist - title`.
pub fn canonical_stem(artist: &str, title: &str) -> String {
    let raw = format!("{} - {}", artist.trim(), title.trim()).to_lowercase();

    let cleaned: String = raw
        .chars()
        .filter(|c| !UNSAFE_CHARS.contains(c) && !c.is_control())
        .collect();

    // collapse whitespace runs left behind by removed characters
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    // windows refuses names ending with a dot
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.len() <= MAX_STEM_BYTES {
        return trimmed.to_string();
    }
    let digest = blake3::hash(trimmed.as_bytes()).to_hex();
    let head = truncate_on_char_boundary(trimmed, MAX_STEM_BYTES - DIGEST_LEN - 1);
    format!("{head} {}", &digest.as_str()[..DIGEST_LEN])
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end()
}
