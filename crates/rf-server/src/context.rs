//! Application context shared by every handler and worker.
//!
//! [`AppContext`] is cheap to clone: infrastructure sits behind `Arc`s and
//! the pipeline queue is a channel handle.

use std::sync::Arc;

use rf_av::SegmentEncoder;
use rf_core::config::Config;
use rf_core::sessions::SessionRegistry;
use rf_core::StorageLayout;
use rf_db::pool::DbPool;
use rf_store::Publisher;

use crate::pipeline::PipelineQueue;

#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub layout: Arc<StorageLayout>,
    /// Open live-update sessions, per user.
    pub sessions: Arc<SessionRegistry>,
    pub encoder: Arc<dyn SegmentEncoder>,
    pub publisher: Publisher,
    /// Work queue feeding the pipeline workers.
    pub queue: PipelineQueue,
}
