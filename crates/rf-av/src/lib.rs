//! # rf-av
//!
//! External media tooling for the reelforge pipeline.
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- locate ffmpeg and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support that keeps the tool's diagnostics on failure.
//! - **Codec probing** ([`probe_codecs`]) -- ffprobe JSON to [`SourceCodecs`].
//! - **Segment encoding** ([`SegmentEncoder`], [`FfmpegEncoder`]) -- split a
//!   source into an HLS index plus MPEG-TS segments, and grab a thumbnail.

pub mod command;
pub mod encoder;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use encoder::{CodecPlan, EncodedStream, EncoderSettings, FfmpegEncoder, SegmentEncoder};
pub use probe::{probe_codecs, SourceCodecs};
pub use tools::{ToolInfo, ToolRegistry};
