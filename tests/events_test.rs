//! Integration tests for the SSE events endpoint.

mod common;

use std::time::Duration;

use common::*;
use rf_core::events::{StatusEvent, VideoStatusPayload};
use rf_core::{UserId, VideoStatus};

/// Read from `resp` until the accumulated body satisfies `done`.
async fn read_while(resp: &mut reqwest::Response, done: impl Fn(&str) -> bool) -> String {
    let mut body = String::new();
    let read = async {
        while !done(&body) {
            match resp.chunk().await.unwrap() {
                Some(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
                None => break,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for SSE data");
    body
}

async fn read_until(resp: &mut reqwest::Response, needle: &str) -> String {
    read_while(resp, |body| body.contains(needle)).await
}

async fn wait_for_sessions(h: &TestHarness, user: &UserId, count: usize) {
    let wait = async {
        while h.ctx.sessions.session_count(user) != count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("session count never reached");
}

#[tokio::test]
async fn sse_stream_connects() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut resp = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.contains("text/event-stream"), "expected SSE content-type, got: {ct}");

    let body = read_until(&mut resp, "connected").await;
    assert!(body.starts_with(':'), "expected a comment first, got: {body}");
}

#[tokio::test]
async fn published_event_reaches_the_stream() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    let anonymous = UserId::anonymous();

    let mut resp = client
        .get(format!("http://{addr}/api/events?page=/videos"))
        .send()
        .await
        .unwrap();
    read_until(&mut resp, "connected").await;
    wait_for_sessions(&h, &anonymous, 1).await;

    let event = StatusEvent::video_status(&VideoStatusPayload {
        id: vid("abc123"),
        title: "Holiday".into(),
        status: VideoStatus::ProcessingFailed,
        thumbnail: None,
    });
    assert_eq!(h.ctx.sessions.publish(&anonymous, &event), 1);

    let body = read_while(&mut resp, |body| {
        body.split_once("event: video_status")
            .is_some_and(|(_, rest)| rest.contains("\n\n"))
    })
    .await;
    let data = body
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .expect("no data line");
    let payload: VideoStatusPayload = serde_json::from_str(data).unwrap();
    assert_eq!(payload.status, VideoStatus::ProcessingFailed);
    assert!(!data.contains("thumbnail"));
}

#[tokio::test]
async fn disconnect_closes_the_session() {
    // Short heartbeat so the server notices the closed socket quickly.
    let mut config = rf_core::config::Config::default();
    config.sessions.heartbeat_secs = 1;
    let (h, addr) = TestHarness::with_server_config(config).await;
    let client = reqwest::Client::new();
    let anonymous = UserId::anonymous();

    let mut first = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap();
    read_until(&mut first, "connected").await;
    let mut second = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap();
    read_until(&mut second, "connected").await;
    wait_for_sessions(&h, &anonymous, 2).await;

    drop(first);
    wait_for_sessions(&h, &anonymous, 1).await;
    drop(second);
    wait_for_sessions(&h, &anonymous, 0).await;
    assert_eq!(h.ctx.sessions.user_count(), 0);
}

#[tokio::test]
async fn events_are_scoped_to_the_caller() {
    let (h, addr) = TestHarness::with_server_config(auth_config()).await;
    let client = reqwest::Client::new();

    let mut resp = client
        .get(format!("http://{addr}/api/events"))
        .header("authorization", bearer("alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    read_until(&mut resp, "connected").await;
    wait_for_sessions(&h, &user("alice"), 1).await;
    assert_eq!(h.ctx.sessions.session_count(&user("bob")), 0);

    let event = StatusEvent::video_status(&VideoStatusPayload {
        id: vid("bobs"),
        title: "Bob".into(),
        status: VideoStatus::ProcessingCompleted,
        thumbnail: None,
    });
    assert_eq!(h.ctx.sessions.publish(&user("bob"), &event), 0);
}

#[tokio::test]
async fn events_require_identity_when_enabled() {
    let (_h, addr) = TestHarness::with_server_config(auth_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
