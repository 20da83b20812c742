//! Prometheus metrics.
//!
//! The recorder is process-global; [`install`] sets it up on first use and
//! later calls return the same handle.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const CHUNKS_RECEIVED: &str = "reelforge_upload_chunks_total";
pub const UPLOADS_COMPLETED: &str = "reelforge_uploads_completed_total";
pub const UPLOADS_REJECTED: &str = "reelforge_uploads_rejected_total";
pub const PIPELINE_RUNS: &str = "reelforge_pipeline_runs_total";
pub const PIPELINE_IN_FLIGHT: &str = "reelforge_pipeline_in_flight";
pub const ENCODE_SECONDS: &str = "reelforge_encode_seconds";
pub const EVENTS_DELIVERED: &str = "reelforge_status_events_delivered_total";

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder if no recorder is installed yet.
pub fn install() -> Option<&'static PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Metrics recorder not installed: {e}");
                None
            }
        })
        .as_ref()
}

/// Current metrics in the Prometheus text format.
pub fn render() -> String {
    match install() {
        Some(handle) => handle.render(),
        None => "# No metrics recorder installed\n".to_string(),
    }
}
