//! On-disk layout of the storage root.
//!
//! ```text
//! <root>/video/<id>.mp4                       assembled upload
//! <root>/segments/<id>/<id>.m3u8              index
//! <root>/segments/<id>/<id>_segment_no_N.ts   segments
//! <root>/thumbnails/<id>/<id>_thumbnail.png   still frame
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ids::VideoId;

/// Resolves working paths below a storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding assembled uploads.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("video")
    }

    /// Directory holding one sub-directory of segments per video.
    pub fn segments_root(&self) -> PathBuf {
        self.root.join("segments")
    }

    /// Directory holding one sub-directory of thumbnails per video.
    pub fn thumbnails_root(&self) -> PathBuf {
        self.root.join("thumbnails")
    }

    /// The file chunks are appended to.
    pub fn upload_file(&self, id: &VideoId) -> PathBuf {
        self.uploads_dir().join(format!("{id}.mp4"))
    }

    pub fn segments_dir(&self, id: &VideoId) -> PathBuf {
        self.segments_root().join(id.as_str())
    }

    pub fn thumbnail_dir(&self, id: &VideoId) -> PathBuf {
        self.thumbnails_root().join(id.as_str())
    }

    /// Create the three top-level working directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.uploads_dir(),
            self.segments_root(),
            self.thumbnails_root(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
