//! Database layer.
//!
//! This module provides the two components of the persistence core:
//! - Connection pool management
//! - The position-ordered lesson repository
//! - Schema bootstrap shared by both

pub mod pool;
pub mod repository;
pub mod schema;

pub use pool::{ConnectionGuard, ConnectionPool, PooledConnection};
pub use repository::LessonRepository;
pub use schema::ensure_schema;
