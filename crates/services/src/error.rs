//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{CourseId, StudentId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progress, grading and completion services.
///
/// Every variant except `Storage` is raised before anything is written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackingError {
    #[error("student {student_id} is not enrolled in course {course_id}")]
    NotEnrolled {
        student_id: StudentId,
        course_id: CourseId,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("attempt limit exceeded: {attempts} of {max} attempts used")]
    AttemptLimitExceeded { attempts: u32, max: u32 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TrackingError {
    pub(crate) fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Short machine-readable name, used in logs and CLI output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::NotEnrolled { .. } => "NOT_ENROLLED",
            TrackingError::NotFound { .. } => "NOT_FOUND",
            TrackingError::AttemptLimitExceeded { .. } => "ATTEMPT_LIMIT_EXCEEDED",
            TrackingError::InvalidInput(_) => "INVALID_INPUT",
            TrackingError::Storage(_) => "INTERNAL",
        }
    }
}

/// Errors raised while wiring services to a backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    SqliteInit(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_internal() {
        let err: TrackingError = StorageError::Connection("closed".into()).into();
        assert_eq!(err.code(), "INTERNAL");
        assert_eq!(err.to_string(), "connection error: closed");
    }

    #[test]
    fn not_enrolled_message_names_both_ids() {
        let err = TrackingError::NotEnrolled {
            student_id: StudentId::new(3),
            course_id: CourseId::new(4),
        };
        assert_eq!(err.to_string(), "student 3 is not enrolled in course 4");
        assert_eq!(err.code(), "NOT_ENROLLED");
    }
}
