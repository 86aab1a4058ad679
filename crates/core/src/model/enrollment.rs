use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, StudentId};

/// Completion status of an enrollment.
///
/// `InProgress -> Completed` is the only transition; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    InProgress,
    Completed,
}

/// Links a student to a course and carries its completion timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    #[must_use]
    pub fn new(student_id: StudentId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            student_id,
            course_id,
            enrolled_at,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> EnrollmentStatus {
        if self.completed_at.is_some() {
            EnrollmentStatus::Completed
        } else {
            EnrollmentStatus::InProgress
        }
    }

    /// Certificates are issued elsewhere; eligibility is just "completed".
    #[must_use]
    pub fn is_certificate_eligible(&self) -> bool {
        self.completed_at.is_some()
    }
}
