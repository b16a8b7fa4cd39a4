//! Data models for the catalog store.

pub mod lesson;

pub use lesson::{Lesson, NewLesson};
