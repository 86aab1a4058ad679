use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::course::Course;
use crate::model::ids::StudentId;
use crate::model::quiz::Quiz;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown notification kind: {0}")]
pub struct UnknownKind(pub String);

/// Kinds of notification the progress subsystem emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    CourseCompleted,
    QuizGraded,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::CourseCompleted => "COURSE_COMPLETED",
            NotificationKind::QuizGraded => "QUIZ_GRADED",
        }
    }

    /// # Errors
    ///
    /// Returns `UnknownKind` for anything other than the stored spellings.
    pub fn parse(s: &str) -> Result<Self, UnknownKind> {
        match s {
            "COURSE_COMPLETED" => Ok(NotificationKind::CourseCompleted),
            "QUIZ_GRADED" => Ok(NotificationKind::QuizGraded),
            other => Err(UnknownKind(other.to_owned())),
        }
    }
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: StudentId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: u64,
    pub link: String,
}

impl NewNotification {
    /// Congratulation sent once when an enrollment becomes completed.
    #[must_use]
    pub fn course_completed(user_id: StudentId, course: &Course) -> Self {
        Self {
            user_id,
            kind: NotificationKind::CourseCompleted,
            title: "Curso completado".to_owned(),
            message: format!(
                "¡Felicitaciones! Has completado el curso \"{}\"",
                course.title()
            ),
            related_id: course.id().value(),
            link: format!("/courses/{}", course.id()),
        }
    }

    /// Sent after every graded attempt, passed or not.
    #[must_use]
    pub fn quiz_graded(user_id: StudentId, quiz: &Quiz, score: u32, passed: bool) -> Self {
        let verdict = if passed {
            "¡Felicitaciones!".to_owned()
        } else {
            format!("Necesitas {}% para aprobar.", quiz.passing_score())
        };
        Self {
            user_id,
            kind: NotificationKind::QuizGraded,
            title: if passed { "Quiz aprobado" } else { "Quiz no aprobado" }.to_owned(),
            message: format!(
                "Has obtenido {score}% en el quiz \"{}\". {verdict}",
                quiz.title()
            ),
            related_id: quiz.id().value(),
            link: format!("/lessons/{}", quiz.lesson_id()),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(flatten)]
    pub content: NewNotification,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{CourseId, LessonId, QuizId};

    fn quiz() -> Quiz {
        Quiz::new(QuizId::new(3), LessonId::new(8), "Repaso", 80, None, vec![]).unwrap()
    }

    #[test]
    fn course_completed_message() {
        let course = Course::new(CourseId::new(4), "Rust básico").unwrap();
        let n = NewNotification::course_completed(StudentId::new(1), &course);
        assert_eq!(n.kind, NotificationKind::CourseCompleted);
        assert_eq!(
            n.message,
            "¡Felicitaciones! Has completado el curso \"Rust básico\""
        );
        assert_eq!(n.related_id, 4);
        assert_eq!(n.link, "/courses/4");
    }

    #[test]
    fn quiz_graded_messages() {
        let passed = NewNotification::quiz_graded(StudentId::new(1), &quiz(), 90, true);
        assert_eq!(
            passed.message,
            "Has obtenido 90% en el quiz \"Repaso\". ¡Felicitaciones!"
        );

        let failed = NewNotification::quiz_graded(StudentId::new(1), &quiz(), 50, false);
        assert_eq!(
            failed.message,
            "Has obtenido 50% en el quiz \"Repaso\". Necesitas 80% para aprobar."
        );
        assert_eq!(failed.link, "/lessons/8");
        assert_eq!(failed.related_id, 3);
    }

    #[test]
    fn kind_round_trips_through_storage_spelling() {
        for kind in [NotificationKind::CourseCompleted, NotificationKind::QuizGraded] {
            assert_eq!(NotificationKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(NotificationKind::parse("FORUM_REPLY").is_err());
    }
}
