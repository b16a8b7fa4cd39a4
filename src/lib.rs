//! Course catalog persistence core.
//!
//! Two components, in dependency order: a pool of SQLite sessions
//! ([`db::ConnectionPool`]) that lends and reclaims connections without ever
//! blocking an acquirer, and a repository ([`db::LessonRepository`]) that
//! keeps each course's lesson positions a contiguous 1..N sequence across
//! inserts, moves, and deletes, one transaction per write.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::StoreConfig;
pub use db::{ConnectionPool, LessonRepository};
pub use error::{StoreError, StoreResult};
