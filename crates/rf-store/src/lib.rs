//! rf-store: publication of processed artifacts to the remote object store.
//!
//! [`keys`] derives the object keys, [`remote`] talks to the store through
//! the [`ObjectStore`] trait, and [`publisher`] moves whole directories of
//! segments and thumbnails out of local storage.

pub mod keys;
pub mod publisher;
pub mod remote;

pub use keys::{artifact_key, content_key};
pub use publisher::{DeleteReport, PublishReport, Publisher};
pub use remote::{ObjectStore, RemoteStore, StoredObject};
