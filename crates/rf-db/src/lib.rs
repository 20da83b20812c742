//! rf-db: persistence for video records.
//!
//! SQLite behind an r2d2 pool, embedded migrations, the [`models::VideoRecord`]
//! model, and the query functions in [`queries::videos`], including the
//! single writer of a video's status.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
