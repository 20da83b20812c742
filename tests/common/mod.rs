//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over an
//! in-memory database, a temporary storage root, an in-memory object store
//! and a fake encoder, with the pipeline workers usually already running. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use rf_av::encoder::{index_file_name, thumbnail_file_name};
use rf_av::{EncodedStream, SegmentEncoder};
use rf_core::config::Config;
use rf_core::sessions::SessionRegistry;
use rf_core::{Error, StorageLayout, UserId, VideoId};
use rf_db::pool::{init_memory_pool, DbPool};
use rf_server::context::AppContext;
use rf_server::pipeline::{spawn_workers, PipelineQueue, PipelineReceiver};
use rf_server::router::build_router;
use rf_store::{ObjectStore, Publisher, StoredObject};

/// Number of segments the fake encoder writes.
pub const FAKE_SEGMENTS: usize = 2;

/// Object store kept in memory. Keys listed in `fail_keys` reject uploads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_keys: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn fail_uploads_of(&self, key: impl Into<String>) {
        self.fail_keys.lock().insert(key.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, key: &str, _file_name: &str, body: Vec<u8>) -> rf_core::Result<StoredObject> {
        if self.fail_keys.lock().contains(key) {
            return Err(Error::remote(500, format!("upload of {key} refused")));
        }
        self.objects.lock().insert(key.to_string(), body);
        Ok(StoredObject {
            id: key.to_string(),
            bucket_id: "test-bucket".into(),
        })
    }

    async fn fetch(&self, key: &str) -> rf_core::Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    async fn delete(&self, key: &str) -> rf_core::Result<bool> {
        Ok(self.objects.lock().remove(key).is_some())
    }

    fn view_url(&self, object: &StoredObject) -> String {
        format!("memory://{}/{}/view", object.bucket_id, object.id)
    }
}

/// Encoder that writes a small index, [`FAKE_SEGMENTS`] segments and a
/// thumbnail without running any external tool.
#[derive(Debug, Default)]
pub struct FakeEncoder {
    pub encodes: AtomicUsize,
}

impl FakeEncoder {
    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

pub fn segment_name(id: &VideoId, n: usize) -> String {
    format!("{id}_segment_no_{n}.ts")
}

#[async_trait]
impl SegmentEncoder for FakeEncoder {
    async fn encode(&self, input: &Path, video_id: &VideoId, out_dir: &Path) -> rf_core::Result<EncodedStream> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        if !input.exists() {
            return Err(Error::tool("ffmpeg", format!("{} missing", input.display())));
        }
        tokio::fs::create_dir_all(out_dir).await?;

        let mut manifest = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
        for n in 0..FAKE_SEGMENTS {
            let name = segment_name(video_id, n);
            tokio::fs::write(out_dir.join(&name), format!("segment {n} of {video_id}")).await?;
            manifest.push_str(&format!("#EXTINF:4.0,\n{name}\n"));
        }
        manifest.push_str("#EXT-X-ENDLIST\n");

        let index_file = out_dir.join(index_file_name(video_id));
        tokio::fs::write(&index_file, manifest).await?;
        Ok(EncodedStream {
            segments_dir: out_dir.to_path_buf(),
            index_file,
        })
    }

    async fn thumbnail(&self, _input: &Path, video_id: &VideoId, out_dir: &Path) -> rf_core::Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(thumbnail_file_name(video_id));
        tokio::fs::write(&path, b"\x89PNG fake").await?;
        Ok(path)
    }
}

/// Encoder whose every call fails, as if ffmpeg were missing.
#[derive(Debug, Default)]
pub struct FailingEncoder;

#[async_trait]
impl SegmentEncoder for FailingEncoder {
    async fn encode(&self, _input: &Path, _video_id: &VideoId, _out_dir: &Path) -> rf_core::Result<EncodedStream> {
        Err(Error::tool("ffmpeg", "exit status 1: invalid data found"))
    }

    async fn thumbnail(&self, _input: &Path, _video_id: &VideoId, _out_dir: &Path) -> rf_core::Result<PathBuf> {
        Err(Error::tool("ffmpeg", "exit status 1: invalid data found"))
    }
}

/// Encoder that writes one segment and then fails, like ffmpeg dying halfway.
#[derive(Debug, Default)]
pub struct HalfEncoder;

#[async_trait]
impl SegmentEncoder for HalfEncoder {
    async fn encode(&self, _input: &Path, video_id: &VideoId, out_dir: &Path) -> rf_core::Result<EncodedStream> {
        tokio::fs::create_dir_all(out_dir).await?;
        tokio::fs::write(out_dir.join(segment_name(video_id, 0)), b"partial").await?;
        Err(Error::tool("ffmpeg", "exit status 1: conversion failed"))
    }

    async fn thumbnail(&self, _input: &Path, _video_id: &VideoId, _out_dir: &Path) -> rf_core::Result<PathBuf> {
        Err(Error::tool("ffmpeg", "exit status 1: invalid data found"))
    }
}

/// Fake encoder that holds every encode until [`GatedEncoder::open`] is called.
#[derive(Debug)]
pub struct GatedEncoder {
    inner: Arc<FakeEncoder>,
    started: AtomicUsize,
    gate: tokio::sync::Semaphore,
}

impl GatedEncoder {
    pub fn new(inner: Arc<FakeEncoder>) -> Self {
        Self {
            inner,
            started: AtomicUsize::new(0),
            gate: tokio::sync::Semaphore::new(0),
        }
    }

    /// Let every held and future encode through.
    pub fn open(&self) {
        self.gate.add_permits(tokio::sync::Semaphore::MAX_PERMITS / 2);
    }

    /// Wait until an encode is being held.
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("encode never started");
    }
}

#[async_trait]
impl SegmentEncoder for GatedEncoder {
    async fn encode(&self, input: &Path, video_id: &VideoId, out_dir: &Path) -> rf_core::Result<EncodedStream> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.inner.encode(input, video_id, out_dir).await
    }

    async fn thumbnail(&self, input: &Path, video_id: &VideoId, out_dir: &Path) -> rf_core::Result<PathBuf> {
        self.inner.thumbnail(input, video_id, out_dir).await
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub store: Arc<MemoryStore>,
    pub fake: Arc<FakeEncoder>,
    pub cancel: CancellationToken,
    _idle_receiver: Option<PipelineReceiver>,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    /// Harness with default configuration and a fake encoder.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Harness with a custom configuration and a fake encoder.
    pub fn with_config(config: Config) -> Self {
        let fake = Arc::new(FakeEncoder::default());
        Self::build(config, fake.clone(), fake, true)
    }

    /// Harness whose encoder always fails.
    pub fn with_failing_encoder() -> Self {
        Self::with_encoder(Config::default(), Arc::new(FailingEncoder))
    }

    /// Harness running the pipeline with `encoder`.
    pub fn with_encoder(config: Config, encoder: Arc<dyn SegmentEncoder>) -> Self {
        Self::build(config, encoder, Arc::new(FakeEncoder::default()), true)
    }

    /// Harness with a gated fake encoder, returned alongside so the test
    /// decides when encodes may finish.
    pub fn with_gated_encoder(config: Config) -> (Self, Arc<GatedEncoder>) {
        let fake = Arc::new(FakeEncoder::default());
        let gated = Arc::new(GatedEncoder::new(fake.clone()));
        (Self::build(config, gated.clone(), fake, true), gated)
    }

    /// Harness whose queue nobody drains.
    pub fn without_workers(config: Config) -> Self {
        let fake = Arc::new(FakeEncoder::default());
        Self::build(config, fake.clone(), fake, false)
    }

    fn build(
        mut config: Config,
        encoder: Arc<dyn SegmentEncoder>,
        fake: Arc<FakeEncoder>,
        workers: bool,
    ) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.root = tmp.path().to_path_buf();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let layout = StorageLayout::new(&config.storage.root);
        layout.ensure_dirs().expect("failed to create storage dirs");

        let store = Arc::new(MemoryStore::default());
        let (queue, receiver) = PipelineQueue::new(config.pipeline.queue_capacity);

        let ctx = AppContext {
            db: db.clone(),
            sessions: Arc::new(SessionRegistry::new(config.sessions.queue_capacity)),
            layout: Arc::new(layout),
            encoder,
            publisher: Publisher::new(store.clone()),
            queue,
            config: Arc::new(config),
        };

        let cancel = CancellationToken::new();
        let idle_receiver = if workers {
            spawn_workers(ctx.clone(), receiver, ctx.config.pipeline.workers, cancel.clone());
            None
        } else {
            Some(receiver)
        };

        Self {
            ctx,
            db,
            store,
            fake,
            cancel,
            _idle_receiver: idle_receiver,
            _tmp: tmp,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        Self::with_config(config).serve().await
    }

    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> rf_db::pool::PooledConnection {
        rf_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Current record for `id`, deleted or not.
    pub fn video(&self, id: &str) -> Option<rf_db::models::VideoRecord> {
        rf_db::queries::videos::get_video(&self.conn(), &vid(id)).expect("query failed")
    }

    /// Wait for the pipeline to go idle, failing the test after a few seconds.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.ctx.queue.wait_idle())
            .await
            .expect("pipeline did not go idle");
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn vid(s: &str) -> VideoId {
    VideoId::parse(s).expect("valid video id")
}

pub fn user(s: &str) -> UserId {
    UserId::parse(s).expect("valid user id")
}

pub const TEST_SECRET: &str = "integration-secret";

/// Config with identity verification turned on.
pub fn auth_config() -> Config {
    let mut config = Config::default();
    config.auth.enabled = true;
    config.auth.secret = Some(TEST_SECRET.into());
    config
}

/// `Authorization` header value for `user`.
pub fn bearer(user_id: &str) -> String {
    let token = rf_server::middleware::auth::issue_token(TEST_SECRET, &user(user_id))
        .expect("failed to sign token");
    format!("Bearer {token}")
}

/// Send one upload chunk.
pub async fn send_chunk(
    client: &reqwest::Client,
    addr: SocketAddr,
    auth: Option<&str>,
    id: &str,
    first: bool,
    file_size: usize,
    body: Vec<u8>,
) -> reqwest::Response {
    let mut req = client
        .post(format!("http://{addr}/api/videos"))
        .header("file-name", id)
        .header("first-chunk", if first { "true" } else { "false" })
        .header("file-size", file_size.to_string())
        .header("title", "Holiday")
        .header("description", "Beach trip")
        .body(body);
    if let Some(auth) = auth {
        req = req.header("authorization", auth);
    }
    req.send().await.expect("request failed")
}

/// Upload `sizes.len()` chunks of the given sizes and return each status.
pub async fn upload(
    client: &reqwest::Client,
    addr: SocketAddr,
    auth: Option<&str>,
    id: &str,
    sizes: &[usize],
) -> Vec<u16> {
    let total: usize = sizes.iter().sum();
    let mut statuses = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let resp = send_chunk(client, addr, auth, id, i == 0, total, vec![b'v'; *size]).await;
        statuses.push(resp.status().as_u16());
    }
    statuses
}
