//! Position-ordered lesson repository.
//!
//! Every write runs inside one transaction on one pooled connection. The
//! transaction is opened with BEGIN IMMEDIATE so the write lock is held
//! before the sibling set is read, which serializes racing reorders on the
//! same course. For a course with N lessons the stored positions are always
//! exactly 1..=N; a failed operation rolls back to the previous set, and
//! the connection goes back to the pool on every path.
//!
//! Lessons without a course are exempt: they are stored and listed but no
//! contiguity is maintained for them.

use crate::db::pool::{ConnectionGuard, ConnectionPool};
use crate::error::{StoreError, StoreResult};
use crate::models::{Lesson, NewLesson};
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

const SELECT_LESSON: &str = "SELECT id, course_id, title, description, video_reference, position \
     FROM lessons WHERE id = ?";

const SELECT_BY_COURSE: &str =
    "SELECT id, course_id, title, description, video_reference, position \
     FROM lessons WHERE course_id = ? ORDER BY position ASC";

const SELECT_UNPARENTED: &str =
    "SELECT id, course_id, title, description, video_reference, position \
     FROM lessons WHERE course_id IS NULL ORDER BY position ASC";

/// Repository for lessons ordered by position within their course.
///
/// Holds a handle to an explicitly constructed [`ConnectionPool`]; there is
/// no global state.
pub struct LessonRepository {
    pool: Arc<ConnectionPool>,
}

impl LessonRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Insert a lesson, returning the generated id.
    ///
    /// With `position: None` the lesson is appended after the course's last
    /// one. An explicit position must fall within 1..=N+1; siblings at or
    /// above it are shifted up by one to open the slot, all inside the same
    /// transaction as the insert.
    pub async fn insert(&self, lesson: &NewLesson) -> StoreResult<i64> {
        let mut guard = self.pool.acquire().await?;
        let result = Self::insert_tx(guard.conn(), lesson).await;
        Self::note_failure(&mut guard, &result);
        guard.release().await;
        let id = result?;
        info!(lesson_id = id, course_id = ?lesson.course_id, "Lesson inserted");
        Ok(id)
    }

    /// Move a lesson and rewrite its payload.
    ///
    /// `previous_position` is the position the caller last observed; it must
    /// match the stored one. When it equals the new position only payload
    /// columns are written. Otherwise the move both opens a slot at the
    /// target position and closes the gap left behind, so siblings stay
    /// contiguous whichever direction the lesson travels.
    pub async fn update(&self, lesson: &Lesson, previous_position: i64) -> StoreResult<()> {
        let mut guard = self.pool.acquire().await?;
        let result = Self::update_tx(guard.conn(), lesson, previous_position).await;
        Self::note_failure(&mut guard, &result);
        guard.release().await;
        result?;
        info!(
            lesson_id = lesson.id,
            position = lesson.position,
            "Lesson updated"
        );
        Ok(())
    }

    /// Delete a lesson and close the gap it leaves in its course.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut guard = self.pool.acquire().await?;
        let result = Self::delete_tx(guard.conn(), id).await;
        Self::note_failure(&mut guard, &result);
        guard.release().await;
        result?;
        info!(lesson_id = id, "Lesson deleted");
        Ok(())
    }

    /// Load one lesson by id.
    pub async fn get(&self, id: i64) -> StoreResult<Lesson> {
        let mut guard = self.pool.acquire().await?;
        let result = sqlx::query_as::<_, Lesson>(SELECT_LESSON)
            .bind(id)
            .fetch_optional(guard.conn())
            .await
            .map_err(StoreError::from);
        Self::note_failure(&mut guard, &result);
        guard.release().await;
        result?.ok_or_else(|| StoreError::not_found(id))
    }

    /// Lessons of one course, sorted by position ascending.
    ///
    /// Single read, no transaction. `None` lists the unparented lessons.
    pub async fn list_by_course(&self, course_id: Option<i64>) -> StoreResult<Vec<Lesson>> {
        let mut guard = self.pool.acquire().await?;
        let query = match course_id {
            Some(course_id) => sqlx::query_as::<_, Lesson>(SELECT_BY_COURSE).bind(course_id),
            None => sqlx::query_as::<_, Lesson>(SELECT_UNPARENTED),
        };
        let result = query
            .fetch_all(guard.conn())
            .await
            .map_err(StoreError::from);
        Self::note_failure(&mut guard, &result);
        guard.release().await;
        result
    }

    async fn insert_tx(conn: &mut SqliteConnection, lesson: &NewLesson) -> StoreResult<i64> {
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        let position = match lesson.course_id {
            Some(course_id) => {
                let count = Self::sibling_count(&mut tx, course_id).await?;
                match lesson.position {
                    None => count + 1,
                    Some(requested) => {
                        if requested < 1 || requested > count + 1 {
                            return Err(StoreError::invalid_position(requested, count + 1));
                        }
                        Self::shift_up(&mut tx, course_id, requested, i64::MAX).await?;
                        requested
                    }
                }
            }
            // Unparented lessons carry no contiguity guarantee: take the
            // requested position as-is, or append after the unparented rows.
            None => match lesson.position {
                Some(requested) => requested,
                None => {
                    let max: i64 = sqlx::query_scalar(
                        "SELECT COALESCE(MAX(position), 0) FROM lessons WHERE course_id IS NULL",
                    )
                    .fetch_one(&mut *tx)
                    .await?;
                    max + 1
                }
            },
        };

        let inserted = sqlx::query(
            "INSERT INTO lessons (course_id, title, description, video_reference, position) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(lesson.course_id)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.video_reference)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted.last_insert_rowid())
    }

    async fn update_tx(
        conn: &mut SqliteConnection,
        lesson: &Lesson,
        previous_position: i64,
    ) -> StoreResult<()> {
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        let stored: Option<(Option<i64>, i64)> =
            sqlx::query_as("SELECT course_id, position FROM lessons WHERE id = ?")
                .bind(lesson.id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((course_id, stored_position)) = stored else {
            return Err(StoreError::not_found(lesson.id));
        };
        if stored_position != previous_position {
            return Err(StoreError::invalid_input(format!(
                "Lesson {} is at position {}, not {}",
                lesson.id, stored_position, previous_position
            )));
        }
        if lesson.course_id != course_id {
            return Err(StoreError::invalid_input(
                "Changing a lesson's course is not supported",
            ));
        }

        if let Some(course_id) = course_id {
            if lesson.position != previous_position {
                let count = Self::sibling_count(&mut tx, course_id).await?;
                if lesson.position < 1 || lesson.position > count {
                    return Err(StoreError::invalid_position(lesson.position, count));
                }
                // The moving lesson is skipped by range: shifting only the
                // rows between the old and new slots both opens the target
                // and closes the gap left at previous_position.
                if lesson.position < previous_position {
                    Self::shift_up(&mut tx, course_id, lesson.position, previous_position - 1)
                        .await?;
                } else {
                    Self::shift_down(&mut tx, course_id, previous_position + 1, lesson.position)
                        .await?;
                }
            }
        }

        sqlx::query(
            "UPDATE lessons SET title = ?, description = ?, video_reference = ?, position = ? \
             WHERE id = ?",
        )
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.video_reference)
        .bind(lesson.position)
        .bind(lesson.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_tx(conn: &mut SqliteConnection, id: i64) -> StoreResult<()> {
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        let stored: Option<(Option<i64>, i64)> =
            sqlx::query_as("SELECT course_id, position FROM lessons WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((course_id, position)) = stored else {
            return Err(StoreError::not_found(id));
        };

        sqlx::query("DELETE FROM lessons WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(course_id) = course_id {
            Self::shift_down(&mut tx, course_id, position + 1, i64::MAX).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sibling_count(tx: &mut Transaction<'_, Sqlite>, course_id: i64) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(count)
    }

    /// Shift positions in `lo..=hi` up by one, highest first so no two rows
    /// ever hold the same position mid-shift.
    async fn shift_up(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: i64,
        lo: i64,
        hi: i64,
    ) -> StoreResult<()> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT id, position FROM lessons \
             WHERE course_id = ? AND position BETWEEN ? AND ? ORDER BY position DESC",
        )
        .bind(course_id)
        .bind(lo)
        .bind(hi)
        .fetch_all(&mut **tx)
        .await?;

        for (id, position) in rows {
            sqlx::query("UPDATE lessons SET position = ? WHERE id = ?")
                .bind(position + 1)
                .bind(id)
                .execute(&mut **tx)
                .await?;
            debug!(lesson_id = id, from = position, to = position + 1, "Shifted lesson up");
        }
        Ok(())
    }

    /// Shift positions in `lo..=hi` down by one, lowest first.
    async fn shift_down(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: i64,
        lo: i64,
        hi: i64,
    ) -> StoreResult<()> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT id, position FROM lessons \
             WHERE course_id = ? AND position BETWEEN ? AND ? ORDER BY position ASC",
        )
        .bind(course_id)
        .bind(lo)
        .bind(hi)
        .fetch_all(&mut **tx)
        .await?;

        for (id, position) in rows {
            sqlx::query("UPDATE lessons SET position = ? WHERE id = ?")
                .bind(position - 1)
                .bind(id)
                .execute(&mut **tx)
                .await?;
            debug!(lesson_id = id, from = position, to = position - 1, "Shifted lesson down");
        }
        Ok(())
    }

    /// A transaction error that indicates a dead session marks the lent
    /// connection closed so the pool discards it at release.
    fn note_failure<T>(guard: &mut ConnectionGuard, result: &StoreResult<T>) {
        if let Err(e) = result {
            if e.is_connection_failure() {
                guard.mark_closed();
            }
        }
    }
}
