//! Segment encoding and thumbnail extraction.
//!
//! [`SegmentEncoder`] is the seam between the pipeline and the codec tool.
//! [`FfmpegEncoder`] is the production implementation; tests substitute
//! their own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rf_core::VideoId;

use crate::command::ToolCommand;
use crate::probe::{probe_codecs, SourceCodecs};
use crate::tools::ToolRegistry;

/// Codec every player can decode without transcoding.
const BASELINE_VIDEO: &str = "h264";
const BASELINE_AUDIO: &str = "aac";

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStream {
    /// Directory holding the index and all segments.
    pub segments_dir: PathBuf,
    /// The `.m3u8` index.
    pub index_file: PathBuf,
}

/// Turns a complete upload into published-ready artifacts.
#[async_trait]
pub trait SegmentEncoder: Send + Sync {
    /// Split `input` into fixed-duration segments and an index inside
    /// `out_dir` (created if missing).
    async fn encode(
        &self,
        input: &Path,
        video_id: &VideoId,
        out_dir: &Path,
    ) -> rf_core::Result<EncodedStream>;

    /// Write a single still frame of `input` into `out_dir` and return its
    /// path.
    async fn thumbnail(
        &self,
        input: &Path,
        video_id: &VideoId,
        out_dir: &Path,
    ) -> rf_core::Result<PathBuf>;
}

/// Stream-copy or re-encode, per stream kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPlan {
    pub video: &'static str,
    pub audio: &'static str,
}

impl CodecPlan {
    /// Copy streams that are already baseline, re-encode everything else
    /// (unknown codecs included).
    pub fn for_source(codecs: &SourceCodecs) -> Self {
        let video = if codecs.video.as_deref() == Some(BASELINE_VIDEO) {
            "copy"
        } else {
            "libx264"
        };
        let audio = if codecs.audio.as_deref() == Some(BASELINE_AUDIO) {
            "copy"
        } else {
            "aac"
        };
        Self { video, audio }
    }
}

/// Tunables for [`FfmpegEncoder`].
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Target duration of each segment, in seconds.
    pub segment_seconds: u32,
    /// x264 preset used when re-encoding video.
    pub preset: String,
    /// Upper bound for one ffmpeg run.
    pub timeout: Duration,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 4,
            preset: "veryfast".into(),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Index file name for a video.
pub fn index_file_name(video_id: &VideoId) -> String {
    format!("{video_id}.m3u8")
}

/// Thumbnail file name for a video.
pub fn thumbnail_file_name(video_id: &VideoId) -> String {
    format!("{video_id}_thumbnail.png")
}

/// ffmpeg arguments producing an HLS index plus MPEG-TS segments.
pub fn segment_args(
    input: &Path,
    video_id: &VideoId,
    out_dir: &Path,
    plan: &CodecPlan,
    settings: &EncoderSettings,
) -> Vec<String> {
    let index = out_dir.join(index_file_name(video_id));
    let pattern = out_dir.join(format!("{video_id}_segment_no_%d.ts"));
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        plan.video.into(),
        "-preset".into(),
        settings.preset.clone(),
        "-c:a".into(),
        plan.audio.into(),
        "-map".into(),
        "0".into(),
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        settings.segment_seconds.to_string(),
        "-segment_format".into(),
        "mpegts".into(),
        "-segment_list".into(),
        index.to_string_lossy().into_owned(),
        "-segment_list_type".into(),
        "m3u8".into(),
        pattern.to_string_lossy().into_owned(),
    ]
}

/// ffmpeg arguments extracting the first frame as PNG.
pub fn thumbnail_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// [`SegmentEncoder`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    tools: Arc<ToolRegistry>,
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    pub fn new(tools: Arc<ToolRegistry>, settings: EncoderSettings) -> Self {
        Self { tools, settings }
    }

    /// Probe the source; an unreadable probe means "re-encode everything".
    async fn plan(&self, input: &Path, video_id: &VideoId) -> CodecPlan {
        let codecs = match self.tools.require("ffprobe") {
            Ok(ffprobe) => match probe_codecs(ffprobe, input).await {
                Ok(codecs) => codecs,
                Err(e) => {
                    tracing::warn!(video_id = %video_id, error = %e, "Probe failed; re-encoding all streams");
                    SourceCodecs::default()
                }
            },
            Err(e) => {
                tracing::warn!(video_id = %video_id, error = %e, "ffprobe unavailable; re-encoding all streams");
                SourceCodecs::default()
            }
        };

        let plan = CodecPlan::for_source(&codecs);
        tracing::info!(
            video_id = %video_id,
            video_codec = codecs.video.as_deref().unwrap_or("unknown"),
            audio_codec = codecs.audio.as_deref().unwrap_or("unknown"),
            video_action = plan.video,
            audio_action = plan.audio,
            "Codec plan"
        );
        plan
    }
}

#[async_trait]
impl SegmentEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        input: &Path,
        video_id: &VideoId,
        out_dir: &Path,
    ) -> rf_core::Result<EncodedStream> {
        let ffmpeg = self.tools.require("ffmpeg")?;
        tokio::fs::create_dir_all(out_dir).await?;

        let plan = self.plan(input, video_id).await;
        let args = segment_args(input, video_id, out_dir, &plan, &self.settings);

        ToolCommand::new(ffmpeg.to_path_buf())
            .args(args)
            .timeout(self.settings.timeout)
            .execute()
            .await?;

        let index_file = out_dir.join(index_file_name(video_id));
        if !index_file.exists() {
            return Err(rf_core::Error::tool(
                "ffmpeg",
                format!("no index written at {}", index_file.display()),
            ));
        }

        Ok(EncodedStream {
            segments_dir: out_dir.to_path_buf(),
            index_file,
        })
    }

    async fn thumbnail(
        &self,
        input: &Path,
        video_id: &VideoId,
        out_dir: &Path,
    ) -> rf_core::Result<PathBuf> {
        let ffmpeg = self.tools.require("ffmpeg")?;
        tokio::fs::create_dir_all(out_dir).await?;

        let output = out_dir.join(thumbnail_file_name(video_id));
        ToolCommand::new(ffmpeg.to_path_buf())
            .args(thumbnail_args(input, &output))
            .timeout(self.settings.timeout)
            .execute()
            .await?;

        Ok(output)
    }
}
