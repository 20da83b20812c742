//! Recovery of work interrupted by a restart, and deletion cleanup.
//!
//! The sweep runs once at startup (and from `reelforge sweep`). It finishes
//! publishing leftover segment directories, drops the ones no run will
//! publish, re-queues uploads that were complete but never encoded, drops
//! stale thumbnail directories, and
//! retries remote cleanup of deleted videos.

use std::path::Path;

use rf_core::events::{StatusEvent, VideoStatusPayload};
use rf_core::{Result, VideoId, VideoStatus};
use rf_db::queries::videos;

use crate::context::AppContext;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Segment directories that were published again.
    pub republished: usize,
    /// Records moved to `ProcessingCompleted` after a full republish.
    pub completed: usize,
    /// Uploads queued for another pipeline run.
    pub requeued: usize,
    /// Segment directories of failed, finished or vanished videos.
    pub segments_removed: usize,
    pub thumbnails_removed: usize,
    /// Deleted records whose remote artifacts are now gone.
    pub purged: usize,
}

/// Run every recovery step. A failing step is logged and the next one runs.
pub async fn run_sweep(ctx: &AppContext) -> SweepReport {
    let mut report = SweepReport::default();

    if let Err(e) = republish_segments(ctx, &mut report).await {
        tracing::warn!(error = %e, "Segment republish failed");
    }
    if let Err(e) = remove_abandoned_segments(ctx, &mut report).await {
        tracing::warn!(error = %e, "Segment cleanup failed");
    }
    if let Err(e) = requeue_uploads(ctx, &mut report).await {
        tracing::warn!(error = %e, "Re-queueing uploads failed");
    }
    if let Err(e) = remove_stale_thumbnails(ctx, &mut report).await {
        tracing::warn!(error = %e, "Thumbnail cleanup failed");
    }
    if let Err(e) = purge_deleted_records(ctx, &mut report).await {
        tracing::warn!(error = %e, "Deleted-video cleanup failed");
    }

    tracing::info!(
        republished = report.republished,
        completed = report.completed,
        requeued = report.requeued,
        segments_removed = report.segments_removed,
        thumbnails_removed = report.thumbnails_removed,
        purged = report.purged,
        "Resume sweep finished"
    );
    report
}

/// Whether a leftover segment directory belongs to a run that was cut short
/// after encoding and may be published now.
fn awaiting_publication(ctx: &AppContext, id: &VideoId) -> bool {
    if ctx.queue.is_in_flight(id) {
        return false;
    }
    let record = rf_db::pool::get_conn(&ctx.db).and_then(|conn| videos::get_video(&conn, id));
    match record {
        Ok(Some(record)) => !record.deleted && record.status == VideoStatus::UploadedOnServer,
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(video_id = %id, error = %e, "Failed to look up leftover segments");
            false
        }
    }
}

async fn republish_segments(ctx: &AppContext, report: &mut SweepReport) -> Result<()> {
    let results = ctx
        .publisher
        .republish_all(&ctx.layout.segments_root(), |id| awaiting_publication(ctx, id))
        .await?;

    for (id, publish) in results {
        report.republished += 1;
        if !publish.dir_removed {
            continue;
        }

        let conn = rf_db::pool::get_conn(&ctx.db)?;
        let Some(record) = videos::get_video(&conn, &id)? else {
            continue;
        };
        if record.deleted || record.status != VideoStatus::UploadedOnServer {
            continue;
        }
        videos::set_status(&conn, &id, VideoStatus::ProcessingCompleted)?;
        drop(conn);

        report.completed += 1;
        tracing::info!(video_id = %id, "Finished interrupted publication");

        let payload = VideoStatusPayload {
            id: id.clone(),
            title: record.title.clone(),
            status: VideoStatus::ProcessingCompleted,
            thumbnail: record.thumbnail_url.clone(),
        };
        ctx.sessions
            .publish(&record.owner_id, &StatusEvent::video_status(&payload));
    }
    Ok(())
}

/// Drop segment directories no run will ever publish: their video failed,
/// finished, or no longer exists.
async fn remove_abandoned_segments(ctx: &AppContext, report: &mut SweepReport) -> Result<()> {
    let root = ctx.layout.segments_root();
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(id) = VideoId::parse(&name) else {
            continue;
        };
        if ctx.queue.is_in_flight(&id) {
            continue;
        }
        let record = {
            let conn = rf_db::pool::get_conn(&ctx.db)?;
            videos::get_video(&conn, &id)?
        };
        // Deleted rows are handled by the purge step.
        let abandoned = match record {
            None => true,
            Some(r) => !r.deleted && r.status.is_terminal(),
        };
        if abandoned {
            tokio::fs::remove_dir_all(entry.path()).await?;
            report.segments_removed += 1;
            tracing::info!(video_id = %id, "Removed abandoned segments");
        }
    }
    Ok(())
}

async fn requeue_uploads(ctx: &AppContext, report: &mut SweepReport) -> Result<()> {
    let pending = {
        let conn = rf_db::pool::get_conn(&ctx.db)?;
        videos::list_by_status(&conn, VideoStatus::UploadedOnServer)?
    };

    for record in pending {
        let id = &record.id;
        if !ctx.layout.upload_file(id).exists() || ctx.layout.segments_dir(id).exists() {
            continue;
        }
        if ctx.queue.enqueue(id.clone())? {
            report.requeued += 1;
        }
    }
    Ok(())
}

async fn remove_stale_thumbnails(ctx: &AppContext, report: &mut SweepReport) -> Result<()> {
    let root = ctx.layout.thumbnails_root();
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if VideoId::parse(&name).is_ok_and(|id| ctx.queue.is_in_flight(&id)) {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
            report.thumbnails_removed += 1;
        }
    }
    Ok(())
}

async fn purge_deleted_records(ctx: &AppContext, report: &mut SweepReport) -> Result<()> {
    let deleted = {
        let conn = rf_db::pool::get_conn(&ctx.db)?;
        videos::list_deleted(&conn)?
    };
    for record in deleted {
        match purge_video(ctx, &record.id).await {
            Ok(true) => report.purged += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(video_id = %record.id, error = %e, "Remote cleanup still failing"),
        }
    }
    Ok(())
}

async fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed local artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove local artifact"),
    }
}

/// Remove everything a logically deleted video left behind, then its row.
///
/// Remote objects go first; if the store fails the row stays so the next
/// sweep can retry. While a pipeline run for the video is queued or running
/// nothing is touched and `false` is returned; the worker purges once the
/// run is over.
pub async fn purge_video(ctx: &AppContext, video_id: &VideoId) -> Result<bool> {
    if ctx.queue.is_in_flight(video_id) {
        tracing::info!(video_id = %video_id, "Pipeline run in flight; purge deferred");
        return Ok(false);
    }

    ctx.publisher.delete_artifacts(video_id).await?;

    remove_path(&ctx.layout.upload_file(video_id)).await;
    remove_path(&ctx.layout.segments_dir(video_id)).await;
    remove_path(&ctx.layout.thumbnail_dir(video_id)).await;

    let conn = rf_db::pool::get_conn(&ctx.db)?;
    if videos::purge_video(&conn, video_id)? {
        tracing::info!(video_id = %video_id, "Video purged");
    }
    Ok(true)
}
