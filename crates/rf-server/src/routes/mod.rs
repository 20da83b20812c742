//! Route handlers for the HTTP API.

pub mod events;
pub mod health;
pub mod metrics;
pub mod stream;
pub mod videos;
