//! Server-Sent Events stream of video status changes.
//!
//! Each connection opens one session in the registry for the calling user.
//! The session lives exactly as long as the response stream: when the client
//! goes away axum drops the stream, which drops the subscription and closes
//! the session.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Extension, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;

use rf_core::UserId;

use crate::context::AppContext;

/// Optional query parameters.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct EventsQuery {
    /// Page the stream was opened from; defaults to the `Referer` header.
    pub page: Option<String>,
}

/// GET /api/events -- SSE stream of `video_status` events for the caller.
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses((status = 200, description = "Event stream", content_type = "text/event-stream"))
)]
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Extension(user): Extension<UserId>,
    Query(params): Query<EventsQuery>,
    headers: HeaderMap,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let page = params
        .page
        .or_else(|| {
            headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_default();

    let mut subscription = ctx.sessions.open(&user, &page);
    let heartbeat = Duration::from_secs(ctx.config.sessions.heartbeat_secs.max(1));

    let stream = async_stream::stream! {
        // Flushes the response headers so the client sees the stream open.
        yield Ok(Event::default().comment("connected"));

        while let Some(event) = subscription.recv().await {
            yield Ok(Event::default().event(event.name.as_str()).data(event.data()));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("ping"))
}
