//! Video lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle of one upload attempt.
///
/// Forward motion is `UploadPending -> UploadedOnServer -> ProcessingCompleted`.
/// `ProcessingFailed` is reachable from any non-terminal state. Nothing leaves
/// `ProcessingCompleted` or `ProcessingFailed`.
///
/// Stored and serialized as the integer code (`-1`, `0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VideoStatus {
    ProcessingFailed,
    UploadPending,
    UploadedOnServer,
    ProcessingCompleted,
}

impl VideoStatus {
    /// Integer code used in the database and in status payloads.
    pub fn code(self) -> i64 {
        match self {
            VideoStatus::ProcessingFailed => -1,
            VideoStatus::UploadPending => 0,
            VideoStatus::UploadedOnServer => 1,
            VideoStatus::ProcessingCompleted => 2,
        }
    }

    /// Parse an integer code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            -1 => Ok(VideoStatus::ProcessingFailed),
            0 => Ok(VideoStatus::UploadPending),
            1 => Ok(VideoStatus::UploadedOnServer),
            2 => Ok(VideoStatus::ProcessingCompleted),
            other => Err(Error::Validation(format!("unknown video status {other}"))),
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VideoStatus::ProcessingFailed | VideoStatus::ProcessingCompleted
        )
    }

    /// Whether moving from `self` to `next` is a legitimate transition.
    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            VideoStatus::ProcessingFailed => true,
            _ => next.code() > self.code(),
        }
    }
}

impl TryFrom<i64> for VideoStatus {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        Self::from_code(code)
    }
}

impl From<VideoStatus> for i64 {
    fn from(status: VideoStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VideoStatus::ProcessingFailed => "processing_failed",
            VideoStatus::UploadPending => "upload_pending",
            VideoStatus::UploadedOnServer => "uploaded_on_server",
            VideoStatus::ProcessingCompleted => "processing_completed",
        };
        f.write_str(s)
    }
}
