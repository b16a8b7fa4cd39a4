//! Schema bootstrap.

use crate::error::StoreResult;
use sqlx::SqliteConnection;

const CREATE_LESSONS: &str = r#"
CREATE TABLE IF NOT EXISTS lessons (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id       INTEGER,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    video_reference TEXT,
    position        INTEGER NOT NULL
)
"#;

const CREATE_LESSONS_ORDER_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_lessons_course_position \
     ON lessons (course_id, position)";

/// Create the lessons table and its ordering index if missing.
///
/// Position contiguity is enforced by the repository, not by a database
/// constraint; the column only carries NOT NULL here.
pub async fn ensure_schema(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query(CREATE_LESSONS).execute(&mut *conn).await?;
    sqlx::query(CREATE_LESSONS_ORDER_INDEX)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        ensure_schema(&mut conn).await.unwrap();
        ensure_schema(&mut conn).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'lessons'")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
