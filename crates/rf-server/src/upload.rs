//! Chunked upload assembly.
//!
//! A client sends a video as a sequence of `POST /api/videos` requests, each
//! carrying the next slice of bytes. The first chunk creates the record and
//! truncates the working file; later chunks append. After every append the
//! size on disk is compared with the declared total and, once they match,
//! the record moves to `UploadedOnServer` and a pipeline run is queued.

use axum::http::HeaderMap;
use tokio::io::AsyncWriteExt;

use rf_core::{Error, Result, UserId, VideoId, VideoStatus};
use rf_db::queries::videos;

use crate::context::AppContext;
use crate::telemetry;

pub const HEADER_FILE_NAME: &str = "file-name";
pub const HEADER_FIRST_CHUNK: &str = "first-chunk";
pub const HEADER_LAST_CHUNK: &str = "last-chunk";
pub const HEADER_FILE_SIZE: &str = "file-size";
pub const HEADER_TITLE: &str = "title";
pub const HEADER_DESCRIPTION: &str = "description";

pub const COMPLETE_MESSAGE: &str = "Video received completely and is now being processed.";
pub const PARTIAL_MESSAGE: &str = "Receiving chunks of the video.";

/// Body of the 400 sent when the declared size is over the limit.
pub fn too_large_message(limit: u64) -> String {
    format!(
        "File size greater than {} MB is not acceptable",
        limit / (1024 * 1024)
    )
}

/// Per-chunk metadata carried in request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeaders {
    pub video_id: VideoId,
    pub first_chunk: bool,
    /// Explicit end-of-upload marker, when the client sends one.
    pub last_chunk: Option<bool>,
    /// Declared total size in bytes.
    pub file_size: u64,
    pub title: Option<String>,
    pub description: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_flag(headers: &HeaderMap, name: &str) -> Result<Option<bool>> {
    match header_str(headers, name) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(v) => Err(Error::Validation(format!("{name} must be true or false, got {v:?}"))),
    }
}

impl ChunkHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let name = header_str(headers, HEADER_FILE_NAME)
            .ok_or_else(|| Error::Validation(format!("{HEADER_FILE_NAME} header missing")))?;
        let video_id = VideoId::parse(name)?;

        let file_size = header_str(headers, HEADER_FILE_SIZE)
            .ok_or_else(|| Error::Validation(format!("{HEADER_FILE_SIZE} header missing")))?
            .parse::<u64>()
            .map_err(|e| Error::Validation(format!("invalid {HEADER_FILE_SIZE}: {e}")))?;

        Ok(Self {
            video_id,
            first_chunk: parse_flag(headers, HEADER_FIRST_CHUNK)?.unwrap_or(false),
            last_chunk: parse_flag(headers, HEADER_LAST_CHUNK)?,
            file_size,
            title: header_str(headers, HEADER_TITLE).map(String::from),
            description: header_str(headers, HEADER_DESCRIPTION)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// What a chunk did to its upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More bytes are expected.
    Partial { received: u64 },
    /// The file is whole and a pipeline run was queued.
    Complete,
    /// Declared size is over the configured limit; nothing was written.
    TooLarge { limit: u64 },
}

/// Decide whether `received` bytes finish an upload of `expected` bytes.
fn is_complete(received: u64, expected: u64, last_chunk: Option<bool>, require_flag: bool) -> Result<bool> {
    if received > expected {
        return Err(Error::Validation(format!(
            "received {received} bytes, more than the declared {expected}"
        )));
    }
    match last_chunk {
        Some(true) if received < expected => Err(Error::Validation(format!(
            "last chunk received but only {received} of {expected} bytes arrived"
        ))),
        Some(flag) => Ok(flag),
        None => Ok(!require_flag && received == expected),
    }
}

/// Apply one chunk from `user`.
pub async fn accept_chunk(
    ctx: &AppContext,
    user: &UserId,
    chunk: &ChunkHeaders,
    body: &[u8],
) -> Result<ChunkOutcome> {
    let limit = ctx.config.upload.max_file_size;
    if chunk.file_size > limit {
        tracing::info!(video_id = %chunk.video_id, size = chunk.file_size, limit, "Rejected oversize upload");
        metrics::counter!(telemetry::UPLOADS_REJECTED).increment(1);
        return Ok(ChunkOutcome::TooLarge { limit });
    }

    let id = &chunk.video_id;
    let path = ctx.layout.upload_file(id);

    if chunk.first_chunk {
        let title = chunk
            .title
            .as_deref()
            .ok_or_else(|| Error::Validation(format!("{HEADER_TITLE} header missing")))?;
        {
            let conn = rf_db::pool::get_conn(&ctx.db)?;
            videos::create_video(&conn, id, user, title, &chunk.description)?;
        }
        tracing::info!(video_id = %id, user_id = %user, size = chunk.file_size, "Started receiving upload");

        if let Err(e) = write_first_chunk(&path, body).await {
            tracing::error!(video_id = %id, error = %e, "Failed to store first chunk; dropping record");
            let conn = rf_db::pool::get_conn(&ctx.db)?;
            videos::discard_pending(&conn, id)?;
            return Err(e.into());
        }
    } else {
        let record = {
            let conn = rf_db::pool::get_conn(&ctx.db)?;
            videos::get_owned_video(&conn, id, user)?
        };
        if record.status != VideoStatus::UploadPending {
            return Err(Error::Conflict(format!(
                "video {id} is {}, not accepting chunks",
                record.status
            )));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await?;
        file.write_all(body).await?;
        file.flush().await?;
    }

    metrics::counter!(telemetry::CHUNKS_RECEIVED).increment(1);

    let received = tokio::fs::metadata(&path).await?.len();
    let complete = is_complete(
        received,
        chunk.file_size,
        chunk.last_chunk,
        ctx.config.upload.require_last_chunk,
    )?;

    if !complete {
        tracing::debug!(video_id = %id, received, expected = chunk.file_size, "Chunk appended");
        return Ok(ChunkOutcome::Partial { received });
    }

    {
        let conn = rf_db::pool::get_conn(&ctx.db)?;
        videos::set_status(&conn, id, VideoStatus::UploadedOnServer)?;
    }
    tracing::info!(video_id = %id, user_id = %user, size = received, "Upload complete");
    metrics::counter!(telemetry::UPLOADS_COMPLETED).increment(1);

    ctx.queue.enqueue(id.clone())?;
    Ok(ChunkOutcome::Complete)
}

async fn write_first_chunk(path: &std::path::Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn parses_first_chunk() {
        let h = ChunkHeaders::from_headers(&headers(&[
            ("file-name", "abc123"),
            ("first-chunk", "true"),
            ("file-size", "8000"),
            ("title", "Trip"),
        ]))
        .unwrap();
        assert_eq!(h.video_id.as_str(), "abc123");
        assert!(h.first_chunk);
        assert_eq!(h.last_chunk, None);
        assert_eq!(h.file_size, 8000);
        assert_eq!(h.title.as_deref(), Some("Trip"));
        assert_eq!(h.description, "");
    }

    #[test]
    fn missing_or_bad_headers_are_validation_errors() {
        let cases = [
            headers(&[("file-size", "10")]),
            headers(&[("file-name", "abc"), ("file-size", "ten")]),
            headers(&[("file-name", "../etc"), ("file-size", "10")]),
            headers(&[("file-name", "abc"), ("file-size", "10"), ("first-chunk", "yes")]),
        ];
        for h in cases {
            let err = ChunkHeaders::from_headers(&h).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "unexpected: {err:?}");
        }
    }

    #[test]
    fn completion_by_size() {
        assert!(!is_complete(5000, 8000, None, false).unwrap());
        assert!(is_complete(8000, 8000, None, false).unwrap());
        assert!(is_complete(9000, 8000, None, false).is_err());
    }

    #[test]
    fn completion_flag_overrides_size() {
        assert!(!is_complete(8000, 8000, Some(false), false).unwrap());
        assert!(is_complete(8000, 8000, Some(true), true).unwrap());
        assert!(is_complete(5000, 8000, Some(true), false).is_err());
        assert!(!is_complete(8000, 8000, None, true).unwrap());
    }

    #[test]
    fn too_large_message_tracks_limit() {
        assert_eq!(
            too_large_message(rf_core::config::DEFAULT_MAX_FILE_SIZE),
            "File size greater than 15 MB is not acceptable"
        );
    }
}
