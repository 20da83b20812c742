//! rf-core: shared types, errors, configuration, and the live-status broker.
//!
//! Every other rf-* crate depends on this one. It provides the typed
//! identifiers, the video lifecycle enum, a unified error type, the
//! application configuration, the on-disk storage layout, and the
//! per-user [`sessions::SessionRegistry`] that fans status events out to
//! open browser connections.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod layout;
pub mod sessions;
pub mod status;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use layout::StorageLayout;
pub use status::VideoStatus;
