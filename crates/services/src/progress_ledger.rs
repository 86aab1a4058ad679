use std::sync::Arc;

use course_core::model::{CourseId, LessonId, LessonProgress, StudentId};
use storage::repository::{CatalogRepository, EnrollmentRepository, ProgressRepository};

use crate::Clock;
use crate::error::TrackingError;

/// Records per-student lesson completion facts.
///
/// Writes are idempotent upserts: repeating a completion moves `completed_at`
/// forward and never clears `completed`. Propagation to the enrollment is the
/// `CompletionPropagator`'s job.
#[derive(Clone)]
pub struct ProgressLedger {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressLedger {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            progress,
        }
    }

    /// Mark a lesson completed for a student.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` if the lesson does not exist.
    /// Returns `TrackingError::NotEnrolled` if the student has no enrollment in
    /// the lesson's course; nothing is written in that case.
    /// Returns `TrackingError::Storage` if persistence fails.
    pub async fn mark_lesson_complete(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<LessonProgress, TrackingError> {
        self.record(student_id, lesson_id)
            .await
            .map(|(_, progress)| progress)
    }

    /// Same as `mark_lesson_complete`, also returning the owning course.
    #[tracing::instrument(skip(self), fields(%student_id, %lesson_id))]
    pub(crate) async fn record(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<(CourseId, LessonProgress), TrackingError> {
        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| TrackingError::not_found("lesson", lesson_id.value()))?;
        let course_id = lesson.course_id();

        if self
            .enrollments
            .get_enrollment(student_id, course_id)
            .await?
            .is_none()
        {
            tracing::warn!(%course_id, "refusing completion without enrollment");
            return Err(TrackingError::NotEnrolled {
                student_id,
                course_id,
            });
        }

        let row = self
            .progress
            .upsert_completion(student_id, lesson_id, self.clock.now())
            .await?;
        tracing::debug!(%course_id, completed_at = ?row.completed_at, "lesson marked complete");
        Ok((course_id, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Course, Enrollment, Lesson};
    use course_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    async fn ledger_with(repo: &InMemoryRepository, clock: Clock) -> ProgressLedger {
        let course = Course::new(CourseId::new(1), "Rust").unwrap();
        repo.upsert_course(&course).await.unwrap();
        repo.upsert_lesson(&Lesson::new(LessonId::new(1), course.id(), "Intro", 0).unwrap())
            .await
            .unwrap();
        repo.enroll(&Enrollment::new(StudentId::new(1), course.id(), fixed_now()))
            .await
            .unwrap();
        ProgressLedger::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn repeated_completion_keeps_single_row() {
        let repo = InMemoryRepository::new();
        let first_at = fixed_now();
        let ledger = ledger_with(&repo, Clock::fixed(first_at)).await;
        let first = ledger
            .mark_lesson_complete(StudentId::new(1), LessonId::new(1))
            .await
            .unwrap();

        let later = ProgressLedger {
            clock: Clock::fixed(first_at).advanced(chrono::Duration::hours(2)),
            ..ledger
        };
        let second = later
            .mark_lesson_complete(StudentId::new(1), LessonId::new(1))
            .await
            .unwrap();

        assert!(second.completed);
        assert!(second.completed_at >= first.completed_at);
        let rows = repo
            .progress_for_course(StudentId::new(1), CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unenrolled_student_is_rejected_without_write() {
        let repo = InMemoryRepository::new();
        let ledger = ledger_with(&repo, Clock::fixed(fixed_now())).await;

        let err = ledger
            .mark_lesson_complete(StudentId::new(2), LessonId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::NotEnrolled { .. }));
        assert!(
            repo.get_progress(StudentId::new(2), LessonId::new(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found() {
        let repo = InMemoryRepository::new();
        let ledger = ledger_with(&repo, Clock::fixed(fixed_now())).await;

        let err = ledger
            .mark_lesson_complete(StudentId::new(1), LessonId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackingError::NotFound {
                entity: "lesson",
                id: 404
            }
        ));
    }
}
