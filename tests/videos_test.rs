//! Integration tests for the video read, update, delete and playback routes.

mod common;

use std::time::Duration;

use common::*;
use rf_store::keys;
use serde_json::Value;

async fn get_json(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let (_h, addr) = TestHarness::with_server_config(auth_config()).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("http://{addr}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&client, format!("http://{addr}/api-docs/openapi.json")).await;
    assert_eq!(status, 200);
    assert!(body["paths"]["/api/videos"].is_object());
}

#[tokio::test]
async fn list_detail_and_status() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    assert_eq!(upload(&client, addr, None, "done", &[64]).await, vec![201]);
    h.wait_idle().await;
    assert_eq!(upload(&client, addr, None, "second", &[10]).await, vec![201]);
    h.wait_idle().await;
    let resp = send_chunk(&client, addr, None, "half", true, 100, vec![0; 10]).await;
    assert_eq!(resp.status(), 206);

    let (status, list) = get_json(&client, format!("http://{addr}/api/videos")).await;
    assert_eq!(status, 200);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 3);
    // Newest first.
    assert_eq!(list[0]["id"], "half");
    assert_eq!(list[0]["thumbnail"], "/static/logo/android-chrome-192x192.png");

    let (_, filtered) = get_json(&client, format!("http://{addr}/api/videos?status=0")).await;
    let filtered = filtered.as_array().unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["id"], "half");

    let (status, detail) = get_json(&client, format!("http://{addr}/api/videos/done")).await;
    assert_eq!(status, 200);
    assert_eq!(detail["title"], "Holiday");
    assert_eq!(detail["description"], "Beach trip");
    assert_eq!(detail["status"], 2);
    assert!(detail["thumbnail"].as_str().unwrap().starts_with("memory://"));
    assert!(detail["upload_completed_at"].is_string());

    let (status, current) = get_json(&client, format!("http://{addr}/api/videos/done/status")).await;
    assert_eq!(status, 200);
    assert_eq!(current["id"], "done");
    assert_eq!(current["status"], 2);

    let (status, _) = get_json(&client, format!("http://{addr}/api/videos/missing")).await;
    assert_eq!(status, 404);
    let (status, _) = get_json(&client, format!("http://{addr}/api/videos?status=7")).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn other_users_videos_are_invisible() {
    let (_h, addr) = TestHarness::with_server_config(auth_config()).await;
    let client = reqwest::Client::new();
    let alice = bearer("alice");
    let bob = bearer("bob");

    let resp = send_chunk(&client, addr, Some(&alice), "private", true, 100, vec![0; 10]).await;
    assert_eq!(resp.status(), 206);

    let resp = client
        .get(format!("http://{addr}/api/videos"))
        .header("authorization", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), serde_json::json!([]));

    for path in ["private", "private/status"] {
        let resp = client
            .get(format!("http://{addr}/api/videos/{path}"))
            .header("authorization", &bob)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404, "{path}");
    }

    let resp = client
        .delete(format!("http://{addr}/api/videos/private"))
        .header("authorization", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn update_changes_title_and_description() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    send_chunk(&client, addr, None, "edit", true, 100, vec![0; 10]).await;

    let resp = client
        .put(format!("http://{addr}/api/videos/edit"))
        .json(&serde_json::json!({ "title": "  Renamed ", "description": "New text" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "Renamed");
    assert_eq!(body["description"], "New text");

    let resp = client
        .put(format!("http://{addr}/api/videos/edit"))
        .json(&serde_json::json!({ "title": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("http://{addr}/api/videos/edit"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("http://{addr}/api/videos/absent"))
        .json(&serde_json::json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn delete_hides_then_purges() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    assert_eq!(upload(&client, addr, None, "doomed", &[32, 32]).await, vec![206, 201]);
    h.wait_idle().await;
    assert!(h.store.len() > 0);

    let resp = client
        .delete(format!("http://{addr}/api/videos/doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], true);

    let (status, _) = get_json(&client, format!("http://{addr}/api/videos/doomed")).await;
    assert_eq!(status, 404);

    let purged = async {
        while h.video("doomed").is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), purged)
        .await
        .expect("row was never purged");
    assert_eq!(h.store.len(), 0);

    let resp = client
        .delete(format!("http://{addr}/api/videos/doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stream_serves_index_and_segments() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    upload(&client, addr, None, "movie", &[100]).await;
    h.wait_idle().await;

    let resp = client
        .get(format!("http://{addr}/api/videos/movie/stream/index.m3u8"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/x-mpegURL");
    let manifest = resp.text().await.unwrap();
    let segments = keys::manifest_segments(&manifest);
    assert_eq!(segments.len(), FAKE_SEGMENTS);

    let resp = client
        .get(format!("http://{addr}/api/videos/movie/stream/{}", segments[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/MP2T");
    assert_eq!(resp.text().await.unwrap(), "segment 0 of movie");

    let resp = client
        .get(format!("http://{addr}/api/videos/movie/stream/other_segment_no_0.ts"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("http://{addr}/api/videos/movie/stream/movie_segment_no_9.ts"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/videos/nope"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["x-request-id"], "req-42");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}
