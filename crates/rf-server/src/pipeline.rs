//! Background transcode-and-publish pipeline.
//!
//! Completed uploads are pushed onto a bounded work queue and drained by a
//! fixed pool of workers. Each run extracts and publishes a thumbnail,
//! encodes the upload into segments, publishes them, and moves the record to
//! a terminal status, notifying the owner's open sessions exactly once.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rf_core::events::{StatusEvent, VideoStatusPayload};
use rf_core::{Error, Result, VideoId, VideoStatus};
use rf_db::models::VideoRecord;
use rf_db::queries::videos;

use crate::context::AppContext;
use crate::telemetry;

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Sending side of the work queue.
///
/// Tracks every id that is queued or running so the same video never runs
/// twice at once.
#[derive(Debug, Clone)]
pub struct PipelineQueue {
    sender: mpsc::Sender<VideoId>,
    in_flight: Arc<DashSet<VideoId>>,
}

/// Receiving side of the work queue, shared by the workers.
#[derive(Debug)]
pub struct PipelineReceiver {
    receiver: Mutex<mpsc::Receiver<VideoId>>,
}

impl PipelineQueue {
    /// Create a queue holding at most `capacity` waiting jobs.
    pub fn new(capacity: usize) -> (Self, PipelineReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                in_flight: Arc::new(DashSet::new()),
            },
            PipelineReceiver {
                receiver: Mutex::new(receiver),
            },
        )
    }

    /// Queue a run for `video_id` without waiting.
    ///
    /// When every slot is taken the id stays in flight and a background task
    /// hands it over once a worker frees one. Returns `false` if the video is
    /// already queued or running.
    pub fn enqueue(&self, video_id: VideoId) -> Result<bool> {
        if !self.in_flight.insert(video_id.clone()) {
            tracing::debug!(video_id = %video_id, "Pipeline run already in flight");
            return Ok(false);
        }

        match self.sender.try_send(video_id.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(video_id)) => {
                tracing::warn!(video_id = %video_id, "Pipeline queue full; waiting for a free slot in the background");
                let sender = self.sender.clone();
                let in_flight = Arc::clone(&self.in_flight);
                tokio::spawn(async move {
                    if sender.send(video_id.clone()).await.is_err() {
                        in_flight.remove(&video_id);
                        tracing::warn!(video_id = %video_id, "Pipeline queue closed before the run was handed over");
                    }
                });
            }
            Err(TrySendError::Closed(video_id)) => {
                self.in_flight.remove(&video_id);
                return Err(Error::Internal("pipeline queue closed".into()));
            }
        }

        metrics::gauge!(telemetry::PIPELINE_IN_FLIGHT).set(self.in_flight.len() as f64);
        tracing::info!(video_id = %video_id, "Queued for processing");
        Ok(true)
    }

    /// Whether `video_id` is queued or running.
    pub fn is_in_flight(&self, video_id: &VideoId) -> bool {
        self.in_flight.contains(video_id)
    }

    /// Number of videos queued or running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        while !self.in_flight.is_empty() {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    fn finish(&self, video_id: &VideoId) {
        self.in_flight.remove(video_id);
        metrics::gauge!(telemetry::PIPELINE_IN_FLIGHT).set(self.in_flight.len() as f64);
    }
}

/// Spawn `count` workers (at least one) draining `receiver` until `cancel`
/// fires or the queue closes.
pub fn spawn_workers(
    ctx: AppContext,
    receiver: PipelineReceiver,
    count: usize,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(receiver);
    (0..count.max(1))
        .map(|worker| {
            let ctx = ctx.clone();
            let receiver = Arc::clone(&receiver);
            let cancel = cancel.clone();
            tokio::spawn(async move { run_worker(worker, ctx, receiver, cancel).await })
        })
        .collect()
}

async fn run_worker(
    worker: usize,
    ctx: AppContext,
    receiver: Arc<PipelineReceiver>,
    cancel: CancellationToken,
) {
    tracing::info!(worker, "Pipeline worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { receiver.receiver.lock().await.recv().await } => next,
        };
        let Some(video_id) = next else {
            break;
        };

        run_job(&ctx, &video_id).await;
        ctx.queue.finish(&video_id);
        purge_if_deleted(&ctx, &video_id).await;
    }

    tracing::info!(worker, "Pipeline worker stopped");
}

/// Process one video from its assembled upload to a terminal status.
pub async fn run_job(ctx: &AppContext, video_id: &VideoId) {
    let record = match load_record(ctx, video_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(video_id = %video_id, "Video gone before processing; skipping");
            return;
        }
        Err(e) => {
            tracing::error!(video_id = %video_id, error = %e, "Failed to load video for processing");
            return;
        }
    };

    tracing::info!(video_id = %video_id, user_id = %record.owner_id, "Processing video");

    let thumbnail = publish_thumbnail(ctx, &record).await;

    match encode_and_publish(ctx, &record).await {
        Ok(()) => {
            tracing::info!(video_id = %video_id, "Video processed and published");
            finish(ctx, &record, VideoStatus::ProcessingCompleted, thumbnail);
        }
        Err(e) => {
            tracing::error!(video_id = %video_id, error = %e, "Video processing failed");
            discard_working_files(ctx, video_id).await;
            finish(ctx, &record, VideoStatus::ProcessingFailed, None);
        }
    }
}

/// Drop whatever a failed run left in the working tree so nothing of it is
/// published later.
async fn discard_working_files(ctx: &AppContext, video_id: &VideoId) {
    let segments = ctx.layout.segments_dir(video_id);
    match tokio::fs::remove_dir_all(&segments).await {
        Ok(()) => tracing::debug!(video_id = %video_id, "Removed partial segments"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(video_id = %video_id, error = %e, "Failed to remove partial segments"),
    }
    match tokio::fs::remove_file(ctx.layout.upload_file(video_id)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(video_id = %video_id, error = %e, "Failed to remove assembled upload"),
    }
}

/// Finish a purge that was deferred because the video was deleted while its
/// run was queued or in progress.
async fn purge_if_deleted(ctx: &AppContext, video_id: &VideoId) {
    let deleted = rf_db::pool::get_conn(&ctx.db)
        .and_then(|conn| videos::get_video(&conn, video_id))
        .map(|record| record.is_some_and(|r| r.deleted));

    match deleted {
        Ok(true) => {
            if let Err(e) = crate::sweep::purge_video(ctx, video_id).await {
                tracing::warn!(video_id = %video_id, error = %e, "Deferred purge failed; the sweep will retry");
            }
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(video_id = %video_id, error = %e, "Failed to check for deletion after processing"),
    }
}

fn load_record(ctx: &AppContext, video_id: &VideoId) -> Result<Option<VideoRecord>> {
    let conn = rf_db::pool::get_conn(&ctx.db)?;
    Ok(videos::get_video(&conn, video_id)?.filter(|v| !v.deleted))
}

/// Extract and publish the still frame. Failures only cost the thumbnail.
async fn publish_thumbnail(ctx: &AppContext, record: &VideoRecord) -> Option<String> {
    let id = &record.id;
    let input = ctx.layout.upload_file(id);
    let dir = ctx.layout.thumbnail_dir(id);

    if let Err(e) = ctx.encoder.thumbnail(&input, id, &dir).await {
        tracing::warn!(video_id = %id, error = %e, "Thumbnail extraction failed");
        return None;
    }

    let url = match ctx.publisher.publish_thumbnail(&dir).await {
        Ok(url) => url?,
        Err(e) => {
            tracing::warn!(video_id = %id, error = %e, "Thumbnail publication failed");
            return None;
        }
    };

    let stored = rf_db::pool::get_conn(&ctx.db).and_then(|conn| videos::set_thumbnail(&conn, id, &url));
    if let Err(e) = stored {
        tracing::warn!(video_id = %id, error = %e, "Failed to store thumbnail URL");
    }
    Some(url)
}

async fn encode_and_publish(ctx: &AppContext, record: &VideoRecord) -> Result<()> {
    let id = &record.id;
    let input = ctx.layout.upload_file(id);
    let out_dir = ctx.layout.segments_dir(id);

    let started = std::time::Instant::now();
    let stream = ctx
        .encoder
        .encode(&input, id, &out_dir)
        .await
        .map_err(|e| Error::pipeline("encode", e.to_string()))?;
    metrics::histogram!(telemetry::ENCODE_SECONDS).record(started.elapsed().as_secs_f64());

    if let Err(e) = tokio::fs::remove_file(&input).await {
        tracing::warn!(video_id = %id, error = %e, "Failed to remove assembled upload");
    }

    let report = ctx
        .publisher
        .publish_dir(&stream.segments_dir)
        .await
        .map_err(|e| Error::pipeline("publish", e.to_string()))?;

    if !report.is_complete() {
        return Err(Error::pipeline(
            "publish",
            format!("{} file(s) not published: {}", report.failed.len(), report.failed.join(", ")),
        ));
    }
    Ok(())
}

/// Record the terminal status and notify the owner.
fn finish(ctx: &AppContext, record: &VideoRecord, status: VideoStatus, thumbnail: Option<String>) {
    let updated =
        rf_db::pool::get_conn(&ctx.db).and_then(|conn| videos::set_status(&conn, &record.id, status));

    match updated {
        Ok(()) => {}
        Err(Error::NotFound { .. }) => {
            tracing::info!(video_id = %record.id, "Video deleted during processing; no event sent");
            return;
        }
        Err(e) => {
            tracing::error!(video_id = %record.id, status = %status, error = %e, "Failed to update video status");
        }
    }

    let outcome = if status == VideoStatus::ProcessingCompleted {
        "completed"
    } else {
        "failed"
    };
    metrics::counter!(telemetry::PIPELINE_RUNS, "outcome" => outcome).increment(1);

    let payload = VideoStatusPayload {
        id: record.id.clone(),
        title: record.title.clone(),
        status,
        thumbnail,
    };
    let delivered = ctx
        .sessions
        .publish(&record.owner_id, &StatusEvent::video_status(&payload));
    metrics::counter!(telemetry::EVENTS_DELIVERED).increment(delivered as u64);
    tracing::debug!(video_id = %record.id, status = %status, delivered, "Status event published");
}
