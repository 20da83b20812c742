//! Video record operations.
//!
//! [`set_status`] is the only function that writes the `status` column.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use rf_core::{Error, Result, UserId, VideoId, VideoStatus};

use crate::models::VideoRecord;

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

/// Insert a new record in `UploadPending`.
///
/// An existing row with the same id (deleted or not) is a conflict.
pub fn create_video(
    conn: &Connection,
    id: &VideoId,
    owner: &UserId,
    title: &str,
    description: &str,
) -> Result<VideoRecord> {
    let now = Utc::now().to_rfc3339();
    let result = conn.execute(
        "INSERT INTO videos (id, owner_id, title, description, status, upload_initiated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.as_str(),
            owner.as_str(),
            title,
            description,
            VideoStatus::UploadPending.code(),
            &now
        ],
    );

    match result {
        Ok(_) => Ok(VideoRecord {
            id: id.clone(),
            owner_id: owner.clone(),
            title: title.to_string(),
            description: description.to_string(),
            status: VideoStatus::UploadPending,
            thumbnail_url: None,
            upload_initiated_at: now,
            upload_completed_at: None,
            deleted: false,
        }),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(Error::Conflict(format!("video {id} already exists")))
        }
        Err(e) => Err(db_err(e)),
    }
}

/// Fetch a record by id, including logically deleted ones.
pub fn get_video(conn: &Connection, id: &VideoId) -> Result<Option<VideoRecord>> {
    let q = format!("SELECT {} FROM videos WHERE id = ?1", VideoRecord::COLUMNS);
    conn.query_row(&q, [id.as_str()], VideoRecord::from_row)
        .optional()
        .map_err(db_err)
}

/// Fetch a live record owned by `owner`.
///
/// Missing, deleted, and foreign records are all reported as not found so a
/// caller cannot probe other users' ids.
pub fn get_owned_video(conn: &Connection, id: &VideoId, owner: &UserId) -> Result<VideoRecord> {
    match get_video(conn, id)? {
        Some(v) if !v.deleted && v.is_owned_by(owner) => Ok(v),
        _ => Err(Error::not_found("video", id)),
    }
}

/// List a user's live videos, newest first, optionally filtered by status.
pub fn list_videos(
    conn: &Connection,
    owner: &UserId,
    status: Option<VideoStatus>,
) -> Result<Vec<VideoRecord>> {
    let q = format!(
        "SELECT {} FROM videos
         WHERE owner_id = ?1 AND deleted = 0 AND (?2 IS NULL OR status = ?2)
         ORDER BY upload_initiated_at DESC, id ASC",
        VideoRecord::COLUMNS
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(
            rusqlite::params![owner.as_str(), status.map(VideoStatus::code)],
            VideoRecord::from_row,
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// All live records currently in `status`, oldest first.
pub fn list_by_status(conn: &Connection, status: VideoStatus) -> Result<Vec<VideoRecord>> {
    let q = format!(
        "SELECT {} FROM videos WHERE deleted = 0 AND status = ?1
         ORDER BY upload_initiated_at ASC",
        VideoRecord::COLUMNS
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([status.code()], VideoRecord::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Logically deleted records whose remote cleanup has not finished.
pub fn list_deleted(conn: &Connection) -> Result<Vec<VideoRecord>> {
    let q = format!("SELECT {} FROM videos WHERE deleted = 1", VideoRecord::COLUMNS);
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], VideoRecord::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Move a live record to `status`.
///
/// Moving to `ProcessingCompleted` also stamps `upload_completed_at`.
///
/// # Errors
///
/// - [`Error::NotFound`] when no live record has this id (zero rows).
/// - [`Error::Conflict`] when the current status cannot move to `status`;
///   terminal states never change.
pub fn set_status(conn: &Connection, id: &VideoId, status: VideoStatus) -> Result<()> {
    let current = current_status(conn, id)?.ok_or_else(|| Error::not_found("video", id))?;

    if !current.can_transition_to(status) {
        return Err(Error::Conflict(format!(
            "video {id} cannot move from {current} to {status}"
        )));
    }

    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE videos
             SET status = ?1,
                 upload_completed_at = CASE WHEN ?1 = ?2 THEN ?3 ELSE upload_completed_at END
             WHERE id = ?4 AND deleted = 0 AND status = ?5",
            rusqlite::params![
                status.code(),
                VideoStatus::ProcessingCompleted.code(),
                now,
                id.as_str(),
                current.code()
            ],
        )
        .map_err(db_err)?;

    if n == 0 {
        // Deleted or moved by someone else between the read and the write.
        return match current_status(conn, id)? {
            None => Err(Error::not_found("video", id)),
            Some(now_status) => Err(Error::Conflict(format!(
                "video {id} changed to {now_status} concurrently"
            ))),
        };
    }

    tracing::debug!(video_id = %id, from = %current, to = %status, "Video status updated");
    Ok(())
}

fn current_status(conn: &Connection, id: &VideoId) -> Result<Option<VideoStatus>> {
    let code: Option<i64> = conn
        .query_row(
            "SELECT status FROM videos WHERE id = ?1 AND deleted = 0",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    code.map(VideoStatus::from_code).transpose()
}

/// Store the public thumbnail URL of a live record.
pub fn set_thumbnail(conn: &Connection, id: &VideoId, url: &str) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE videos SET thumbnail_url = ?1 WHERE id = ?2 AND deleted = 0",
            rusqlite::params![url, id.as_str()],
        )
        .map_err(db_err)?;
    if n == 0 {
        return Err(Error::not_found("video", id));
    }
    Ok(())
}

/// Update title and description of a record owned by `owner`.
pub fn update_details(
    conn: &Connection,
    id: &VideoId,
    owner: &UserId,
    title: &str,
    description: &str,
) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE videos SET title = ?1, description = ?2
             WHERE id = ?3 AND owner_id = ?4 AND deleted = 0",
            rusqlite::params![title, description, id.as_str(), owner.as_str()],
        )
        .map_err(db_err)?;
    if n == 0 {
        return Err(Error::not_found("video", id));
    }
    Ok(())
}

/// Logically delete a record owned by `owner` and return it as it was.
pub fn mark_deleted(conn: &Connection, id: &VideoId, owner: &UserId) -> Result<VideoRecord> {
    let mut record = get_owned_video(conn, id, owner)?;
    let n = conn
        .execute(
            "UPDATE videos SET deleted = 1 WHERE id = ?1 AND owner_id = ?2 AND deleted = 0",
            rusqlite::params![id.as_str(), owner.as_str()],
        )
        .map_err(db_err)?;
    if n == 0 {
        return Err(Error::not_found("video", id));
    }
    record.deleted = true;
    Ok(record)
}

/// Remove a logically deleted record for good. Returns whether a row went.
pub fn purge_video(conn: &Connection, id: &VideoId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM videos WHERE id = ?1 AND deleted = 1",
            [id.as_str()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Drop a record whose upload never got past its first chunk, so the same
/// id can start over. Rows in any other status are left alone.
pub fn discard_pending(conn: &Connection, id: &VideoId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM videos WHERE id = ?1 AND status = ?2",
            rusqlite::params![id.as_str(), VideoStatus::UploadPending.code()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}
