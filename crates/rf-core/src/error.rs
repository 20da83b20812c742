//! Unified error type for reelforge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "video").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request conflicts with the current state of a resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Diagnostic output of the tool.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The remote object store answered with an unexpected status.
    #[error("Remote store error [{status}]: {body}")]
    Remote {
        /// HTTP status code, 0 when no response was received.
        status: u16,
        /// Response body or transport error text.
        body: String,
    },

    /// A pipeline step failed.
    #[error("Pipeline error [{step}]: {message}")]
    Pipeline {
        /// The pipeline step that failed.
        step: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Probe(_) => 422,
            Error::Remote { .. } => 502,
            Error::Pipeline { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Probe(_) => "probe_error",
            Error::Remote { .. } => "remote_error",
            Error::Pipeline { .. } => "pipeline_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Remote`].
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        Error::Remote {
            status,
            body: body.into(),
        }
    }

    /// Convenience constructor for [`Error::Pipeline`].
    pub fn pipeline(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Pipeline {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
