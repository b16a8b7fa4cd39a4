//! Lesson model types.
//!
//! A lesson belongs to at most one course and carries a 1-based `position`
//! among the lessons of that course. Lessons without a course are stored but
//! carry no ordering guarantee.

use serde::{Deserialize, Serialize};

/// A stored lesson row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    /// Storage-assigned identity.
    pub id: i64,
    /// Owning course, or None for an unparented lesson.
    pub course_id: Option<i64>,
    pub title: String,
    pub description: String,
    /// Opaque media reference; not interpreted by the store.
    pub video_reference: Option<String>,
    /// 1-based rank among the course's lessons.
    pub position: i64,
}

/// Payload for creating a lesson.
///
/// `position: None` appends after the course's last lesson. An explicit
/// position must fall within `1..=N+1` for a course with N lessons; the
/// repository rejects anything else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLesson {
    pub course_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub video_reference: Option<String>,
    pub position: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_serializes_all_columns() {
        let lesson = Lesson {
            id: 3,
            course_id: Some(1),
            title: "Intro".to_string(),
            description: String::new(),
            video_reference: None,
            position: 2,
        };
        let json = serde_json::to_value(&lesson).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["course_id"], 1);
        assert_eq!(json["position"], 2);
        assert!(json["video_reference"].is_null());
    }

    #[test]
    fn test_new_lesson_default_appends() {
        let lesson = NewLesson::default();
        assert!(lesson.position.is_none());
        assert!(lesson.course_id.is_none());
    }
}
