//! Typed identifier wrappers.
//!
//! Video and user identifiers are caller-supplied strings, so they are
//! newtypes over `String` with validation on construction. Session
//! identifiers are generated here and wrap a random `Uuid`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest accepted video identifier, in bytes.
pub const MAX_VIDEO_ID_LEN: usize = 128;

/// Generate a newtype wrapper over `String`.
///
/// The macro produces a struct with `Display`, `AsRef<str>`, `FromStr`
/// (through the type's `parse` function), and transparent serde.
macro_rules! string_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                /// Borrow the identifier as a string slice.
                #[must_use]
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }

            impl FromStr for $name {
                type Err = Error;

                fn from_str(s: &str) -> Result<Self> {
                    Self::parse(s)
                }
            }
        )+
    };
}

string_id! {
    /// Identifier of a video. Chosen by the uploader (`file-name` header),
    /// used as a path component on disk and as the remote index key.
    VideoId,
    /// Opaque identifier of an authenticated user.
    UserId,
}

impl VideoId {
    /// Validate and wrap a video identifier.
    ///
    /// Accepts 1 to [`MAX_VIDEO_ID_LEN`] bytes of ASCII alphanumerics, `-`
    /// and `_`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Validation("video id must not be empty".into()));
        }
        if s.len() > MAX_VIDEO_ID_LEN {
            return Err(Error::Validation(format!(
                "video id longer than {MAX_VIDEO_ID_LEN} bytes"
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::Validation(format!("invalid video id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl UserId {
    /// Well-known identity used when authentication is disabled.
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Wrap a user identifier. Only emptiness is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Validation("user id must not be empty".into()));
        }
        Ok(Self(s.to_string()))
    }

    /// The anonymous user.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }
}

/// Identifier of one open live-update connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
