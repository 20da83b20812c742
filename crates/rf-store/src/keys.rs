//! Object keys for published artifacts.
//!
//! A file's key is derived from its stem (the name up to the first `.`):
//! the lowercase hex SHA-1 of the stem, cut to [`CONTENT_KEY_LEN`]
//! characters. The `.m3u8` index is the exception and is stored under its
//! stem, which is the video id, so it can be fetched without hashing.

use sha1::{Digest, Sha1};

use rf_core::VideoId;

/// Length of a content key in hex characters.
pub const CONTENT_KEY_LEN: usize = 36;

const INDEX_EXTENSION: &str = "m3u8";
const SEGMENT_EXTENSION: &str = "ts";

/// Split `name` at its first `.` into stem and extension.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    }
}

/// Truncated SHA-1 of `stem`.
pub fn content_key(stem: &str) -> String {
    let mut key = hex::encode(Sha1::digest(stem.as_bytes()));
    key.truncate(CONTENT_KEY_LEN);
    key
}

/// Key under which the file `file_name` is published.
pub fn artifact_key(file_name: &str) -> String {
    match split_name(file_name) {
        (stem, Some(INDEX_EXTENSION)) => stem.to_string(),
        (stem, _) => content_key(stem),
    }
}

/// Key of a video's index.
pub fn index_key(video_id: &VideoId) -> String {
    video_id.to_string()
}

/// Key of a video's thumbnail.
pub fn thumbnail_key(video_id: &VideoId) -> String {
    content_key(&format!("{video_id}_thumbnail"))
}

/// Key of a segment requested by name, or `None` when `segment` is not one
/// of `video_id`'s `.ts` files.
pub fn segment_key(video_id: &VideoId, segment: &str) -> Option<String> {
    let (stem, ext) = split_name(segment);
    let owned = stem
        .strip_prefix(video_id.as_str())
        .is_some_and(|rest| rest.starts_with('_'));
    if ext != Some(SEGMENT_EXTENSION) || !owned || segment.contains('/') {
        return None;
    }
    Some(content_key(stem))
}

/// Segment file names listed in an index, in playback order.
pub fn manifest_segments(manifest: &str) -> Vec<&str> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && line.ends_with(".ts"))
        .map(|line| line.rsplit('/').next().unwrap_or(line))
        .collect()
}

/// Whether `file_name` is an index.
pub fn is_index(file_name: &str) -> bool {
    split_name(file_name).1 == Some(INDEX_EXTENSION)
}
