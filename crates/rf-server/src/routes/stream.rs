//! HLS playback proxied from the object store.

use axum::extract::{Extension, Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use rf_core::{Error, UserId, VideoId};
use rf_db::queries::videos;
use rf_store::keys;

use crate::context::AppContext;
use crate::error::AppError;

pub const INDEX_CONTENT_TYPE: &str = "application/x-mpegURL";
pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

fn owned_id(ctx: &AppContext, user: &UserId, id: &str) -> Result<VideoId, AppError> {
    let id = VideoId::parse(id)?;
    let conn = rf_db::pool::get_conn(&ctx.db)?;
    videos::get_owned_video(&conn, &id, user)?;
    Ok(id)
}

async fn fetch(ctx: &AppContext, key: &str, what: &str) -> Result<Vec<u8>, AppError> {
    ctx.publisher
        .store()
        .fetch(key)
        .await?
        .ok_or_else(|| Error::not_found(what, key).into())
}

/// GET /api/videos/{id}/stream/index.m3u8
#[utoipa::path(
    get,
    path = "/api/videos/{id}/stream/index.m3u8",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "HLS index", content_type = "application/x-mpegURL"),
        (status = 404, description = "Not found")
    )
)]
pub async fn hls_index(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = owned_id(&ctx, &user, &id)?;
    let body = fetch(&ctx, &keys::index_key(&id), "index").await?;
    Ok(([(header::CONTENT_TYPE, INDEX_CONTENT_TYPE)], body))
}

/// GET /api/videos/{id}/stream/{segment}
#[utoipa::path(
    get,
    path = "/api/videos/{id}/stream/{segment}",
    params(
        ("id" = String, Path, description = "Video id"),
        ("segment" = String, Path, description = "Segment file name, e.g. `<id>_segment_no_0.ts`")
    ),
    responses(
        (status = 200, description = "MPEG-TS segment", content_type = "video/MP2T"),
        (status = 400, description = "Not a segment of this video"),
        (status = 404, description = "Not found")
    )
)]
pub async fn hls_segment(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Path((id, segment)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let id = owned_id(&ctx, &user, &id)?;
    let key = keys::segment_key(&id, &segment)
        .ok_or_else(|| Error::Validation(format!("{segment:?} is not a segment of {id}")))?;
    let body = fetch(&ctx, &key, "segment").await?;
    Ok(([(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)], body))
}
