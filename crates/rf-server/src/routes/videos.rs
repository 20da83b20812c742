//! Video API route handlers.
//!
//! Every handler is scoped to the calling user; another user's video answers
//! exactly like a missing one.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use rf_core::events::VideoStatusPayload;
use rf_core::{Error, UserId, VideoId, VideoStatus};
use rf_db::models::VideoRecord;
use rf_db::queries::videos;

use crate::context::AppContext;
use crate::error::AppError;
use crate::upload::{self, ChunkHeaders, ChunkOutcome};

/// Shown for videos that have no thumbnail yet.
pub const DEFAULT_THUMBNAIL: &str = "/static/logo/android-chrome-192x192.png";

/// Query parameters for listing videos.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListVideosParams {
    /// Only videos with this status code (-1, 0, 1, 2).
    pub status: Option<i64>,
}

/// Video as returned by list and detail endpoints.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    /// -1 failed, 0 pending, 1 uploaded, 2 completed.
    pub status: i64,
    pub upload_initiated_at: String,
    pub upload_completed_at: Option<String>,
}

impl VideoResponse {
    fn from_model(v: &VideoRecord) -> Self {
        Self {
            id: v.id.to_string(),
            title: v.title.clone(),
            description: v.description.clone(),
            thumbnail: v
                .thumbnail_url
                .clone()
                .unwrap_or_else(|| DEFAULT_THUMBNAIL.to_string()),
            status: v.status.code(),
            upload_initiated_at: v.upload_initiated_at.clone(),
            upload_completed_at: v.upload_completed_at.clone(),
        }
    }
}

/// Current status, same shape as a `video_status` event.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoStatusResponse {
    pub id: String,
    pub title: String,
    pub status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl From<VideoStatusPayload> for VideoStatusResponse {
    fn from(p: VideoStatusPayload) -> Self {
        Self {
            id: p.id.to_string(),
            title: p.title,
            status: p.status.code(),
            thumbnail: p.thumbnail,
        }
    }
}

/// Request body for updating a video.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateVideoRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

fn parse_id(id: &str) -> Result<VideoId, AppError> {
    VideoId::parse(id).map_err(AppError::from)
}

/// POST /api/videos
#[utoipa::path(
    post,
    path = "/api/videos",
    params(
        ("file-name" = String, Header, description = "Video id, constant across chunks"),
        ("first-chunk" = Option<bool>, Header, description = "true on the first chunk"),
        ("file-size" = u64, Header, description = "Declared total size in bytes"),
        ("last-chunk" = Option<bool>, Header, description = "Explicit end-of-upload marker"),
        ("title" = Option<String>, Header, description = "Required on the first chunk"),
        ("description" = Option<String>, Header)
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Upload complete, processing queued", body = String),
        (status = 206, description = "Chunk stored, more expected", body = String),
        (status = 400, description = "Invalid headers, oversize or over-sent"),
        (status = 404, description = "No such upload for this user"),
        (status = 409, description = "Upload already exists or is no longer pending")
    )
)]
pub async fn upload_chunk(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let chunk = ChunkHeaders::from_headers(&headers)?;

    let response = match upload::accept_chunk(&ctx, &user, &chunk, &body).await? {
        ChunkOutcome::Complete => (StatusCode::CREATED, upload::COMPLETE_MESSAGE).into_response(),
        ChunkOutcome::Partial { .. } => {
            (StatusCode::PARTIAL_CONTENT, upload::PARTIAL_MESSAGE).into_response()
        }
        ChunkOutcome::TooLarge { limit } => {
            (StatusCode::BAD_REQUEST, upload::too_large_message(limit)).into_response()
        }
    };
    Ok(response)
}

/// GET /api/videos
#[utoipa::path(
    get,
    path = "/api/videos",
    params(ListVideosParams),
    responses((status = 200, description = "The caller's videos, newest first", body = Vec<VideoResponse>))
)]
pub async fn list_videos(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Query(params): Query<ListVideosParams>,
) -> Result<Json<Vec<VideoResponse>>, AppError> {
    let status = params.status.map(VideoStatus::from_code).transpose()?;
    let conn = rf_db::pool::get_conn(&ctx.db)?;
    let records = videos::list_videos(&conn, &user, status)?;
    Ok(Json(records.iter().map(VideoResponse::from_model).collect()))
}

/// GET /api/videos/{id}
#[utoipa::path(
    get,
    path = "/api/videos/{id}",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video detail", body = VideoResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_video(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<VideoResponse>, AppError> {
    let id = parse_id(&id)?;
    let conn = rf_db::pool::get_conn(&ctx.db)?;
    let record = videos::get_owned_video(&conn, &id, &user)?;
    Ok(Json(VideoResponse::from_model(&record)))
}

/// GET /api/videos/{id}/status
///
/// Lets a client that reconnects its event stream catch up on a transition
/// it may have missed.
#[utoipa::path(
    get,
    path = "/api/videos/{id}/status",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "Current status", body = VideoStatusResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_video_status(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<VideoStatusResponse>, AppError> {
    let id = parse_id(&id)?;
    let conn = rf_db::pool::get_conn(&ctx.db)?;
    let record = videos::get_owned_video(&conn, &id, &user)?;
    let payload = VideoStatusPayload {
        id: record.id,
        title: record.title,
        status: record.status,
        thumbnail: record.thumbnail_url,
    };
    Ok(Json(payload.into()))
}

/// PUT /api/videos/{id}
#[utoipa::path(
    put,
    path = "/api/videos/{id}",
    params(("id" = String, Path, description = "Video id")),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Updated video", body = VideoResponse),
        (status = 400, description = "Malformed body or empty title"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_video(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<VideoResponse>, AppError> {
    let id = parse_id(&id)?;
    let req: UpdateVideoRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::Validation(format!("invalid request body: {e}")))?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("title must not be empty".into()).into());
    }

    let conn = rf_db::pool::get_conn(&ctx.db)?;
    videos::update_details(&conn, &id, &user, title, req.description.trim())?;
    let record = videos::get_owned_video(&conn, &id, &user)?;
    Ok(Json(VideoResponse::from_model(&record)))
}

/// DELETE /api/videos/{id}
///
/// The video disappears from every read immediately; remote objects and the
/// row itself are removed in the background.
#[utoipa::path(
    delete,
    path = "/api/videos/{id}",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 202, description = "Deletion accepted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_video(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    {
        let conn = rf_db::pool::get_conn(&ctx.db)?;
        videos::mark_deleted(&conn, &id, &user)?;
    }
    tracing::info!(video_id = %id, user_id = %user, "Video deleted");

    let cleanup_id = id.clone();
    tokio::spawn(async move {
        if let Err(e) = crate::sweep::purge_video(&ctx, &cleanup_id).await {
            tracing::warn!(video_id = %cleanup_id, error = %e, "Cleanup failed; will retry on next sweep");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id.to_string(), "deleted": true })),
    ))
}
