//! Codec discovery via ffprobe.
//!
//! Runs `ffprobe -v error -show_entries stream=codec_name,codec_type
//! -show_entries format=filename,duration,bit_rate,size -of json` and keeps
//! the first video and first audio codec.

use std::path::Path;

use serde::Deserialize;

use crate::command::ToolCommand;

/// What the encoder needs to know about a source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCodecs {
    pub video: Option<String>,
    pub audio: Option<String>,
    pub duration_secs: Option<f64>,
    pub bit_rate: Option<u64>,
    pub size: Option<u64>,
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    size: Option<String>,
}

// ---------------------------------------------------------------------------

/// Probe `input` with the ffprobe binary at `ffprobe`.
pub async fn probe_codecs(ffprobe: &Path, input: &Path) -> rf_core::Result<SourceCodecs> {
    let output = ToolCommand::new(ffprobe.to_path_buf())
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_name,codec_type",
            "-show_entries",
            "format=filename,duration,bit_rate,size",
            "-of",
            "json",
        ])
        .arg(input.to_string_lossy())
        .execute()
        .await?;

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON output.
pub fn parse_probe_output(json: &str) -> rf_core::Result<SourceCodecs> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| rf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let first_of = |kind: &str| {
        parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(kind))
            .and_then(|s| s.codec_name.clone())
    };

    let format = parsed.format.as_ref();
    Ok(SourceCodecs {
        video: first_of("video"),
        audio: first_of("audio"),
        duration_secs: format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse().ok()),
        bit_rate: format
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.parse().ok()),
        size: format
            .and_then(|f| f.size.as_deref())
            .and_then(|s| s.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "programs": [],
        "streams": [
            {"codec_name": "hevc", "codec_type": "video"},
            {"codec_name": "opus", "codec_type": "audio"},
            {"codec_name": "aac", "codec_type": "audio"}
        ],
        "format": {
            "filename": "/data/video/abc123.mp4",
            "duration": "12.480000",
            "bit_rate": "2150123",
            "size": "3354000"
        }
    }"#;

    #[test]
    fn parses_first_stream_of_each_kind() {
        let codecs = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(codecs.video.as_deref(), Some("hevc"));
        assert_eq!(codecs.audio.as_deref(), Some("opus"));
        assert_eq!(codecs.duration_secs, Some(12.48));
        assert_eq!(codecs.bit_rate, Some(2_150_123));
        assert_eq!(codecs.size, Some(3_354_000));
    }

    #[test]
    fn missing_audio_and_format() {
        let codecs =
            parse_probe_output(r#"{"streams": [{"codec_name": "h264", "codec_type": "video"}]}"#)
                .unwrap();
        assert_eq!(codecs.video.as_deref(), Some("h264"));
        assert_eq!(codecs.audio, None);
        assert_eq!(codecs.duration_secs, None);
    }

    #[test]
    fn garbage_is_probe_error() {
        let err = parse_probe_output("not json").unwrap_err();
        assert!(matches!(err, rf_core::Error::Probe(_)));
    }
}
