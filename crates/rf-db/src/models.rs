//! Rust structs mapping to database tables.

use rf_core::{UserId, VideoId, VideoStatus};

/// Parse a validated text id column.
fn parse_text<T>(
    row: &rusqlite::Row,
    idx: usize,
    parse: impl Fn(&str) -> rf_core::Result<T>,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    parse(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ---------------------------------------------------------------------------
// VideoRecord
// ---------------------------------------------------------------------------

/// One row of `videos`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub id: VideoId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub status: VideoStatus,
    pub thumbnail_url: Option<String>,
    pub upload_initiated_at: String,
    pub upload_completed_at: Option<String>,
    pub deleted: bool,
}

impl VideoRecord {
    /// Column list matching [`VideoRecord::from_row`].
    pub const COLUMNS: &'static str = "id, owner_id, title, description, status, thumbnail_url,
        upload_initiated_at, upload_completed_at, deleted";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let code: i64 = row.get(4)?;
        let status = VideoStatus::from_code(code).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Integer,
                Box::new(e),
            )
        })?;

        Ok(Self {
            id: parse_text(row, 0, VideoId::parse)?,
            owner_id: parse_text(row, 1, UserId::parse)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status,
            thumbnail_url: row.get(5)?,
            upload_initiated_at: row.get(6)?,
            upload_completed_at: row.get(7)?,
            deleted: row.get::<_, i64>(8)? != 0,
        })
    }

    /// Whether `user` owns this record.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }
}
