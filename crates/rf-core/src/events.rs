//! Status events delivered to live-update sessions.

use serde::{Deserialize, Serialize};

use crate::ids::VideoId;
use crate::status::VideoStatus;

/// Event name used for every video lifecycle notification.
pub const VIDEO_STATUS_EVENT: &str = "video_status";

/// Payload of a `video_status` event, also returned by the status read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatusPayload {
    pub id: VideoId,
    pub title: String,
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// A named message queued for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// SSE event name (`event:` line).
    pub name: String,
    /// JSON payload (`data:` line).
    pub payload: serde_json::Value,
}

impl StatusEvent {
    /// Build a `video_status` event.
    pub fn video_status(payload: &VideoStatusPayload) -> Self {
        Self {
            name: VIDEO_STATUS_EVENT.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// The `data:` line contents.
    pub fn data(&self) -> String {
        self.payload.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(thumbnail: Option<&str>) -> VideoStatusPayload {
        VideoStatusPayload {
            id: VideoId::parse("abc123").unwrap(),
            title: "Holiday".into(),
            status: VideoStatus::ProcessingCompleted,
            thumbnail: thumbnail.map(String::from),
        }
    }

    #[test]
    fn video_status_event_shape() {
        let event = StatusEvent::video_status(&payload(Some("https://x/view")));
        assert_eq!(event.name, "video_status");
        assert_eq!(
            event.payload,
            serde_json::json!({
                "id": "abc123",
                "title": "Holiday",
                "status": 2,
                "thumbnail": "https://x/view"
            })
        );
    }

    #[test]
    fn thumbnail_is_omitted_when_absent() {
        let event = StatusEvent::video_status(&payload(None));
        assert!(event.payload.get("thumbnail").is_none());
        let back: VideoStatusPayload = serde_json::from_str(&event.data()).unwrap();
        assert_eq!(back, payload(None));
    }
}
