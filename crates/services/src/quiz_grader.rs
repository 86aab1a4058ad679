use std::sync::Arc;

use serde::Serialize;

use course_core::grading::{self, Grade};
use course_core::model::{AnswerSheet, NewNotification, QuizId, QuizResult, StudentId};
use storage::repository::{
    CatalogRepository, EnrollmentRepository, NewQuizResult, QuizResultRepository, StorageError,
};

use crate::Clock;
use crate::error::TrackingError;

/// Result of one graded submission, shaped for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    pub result_id: i64,
    #[serde(flatten)]
    pub grade: Grade,
    #[serde(skip)]
    pub result: QuizResult,
}

/// Scores answer sheets and appends attempts under the quiz's attempt limit.
#[derive(Clone)]
pub struct QuizGrader {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    results: Arc<dyn QuizResultRepository>,
}

impl QuizGrader {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        results: Arc<dyn QuizResultRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            results,
        }
    }

    /// Grade `answers`, store the attempt and its `QUIZ_GRADED` notification.
    ///
    /// The attempt-limit check and the insert happen in one storage write, so
    /// concurrent submissions cannot overshoot `max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` if the quiz or its lesson is missing,
    /// including a quiz deleted before the attempt is stored.
    /// Returns `TrackingError::NotEnrolled` if the student is not enrolled in
    /// the quiz's course.
    /// Returns `TrackingError::AttemptLimitExceeded` if no attempts remain; no
    /// result is written.
    /// Returns `TrackingError::Storage` if persistence fails.
    #[tracing::instrument(
        skip(self, answers),
        fields(%student_id, %quiz_id, answered = answers.len())
    )]
    pub async fn submit(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
        answers: AnswerSheet,
    ) -> Result<QuizSubmission, TrackingError> {
        let quiz = self
            .catalog
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| TrackingError::not_found("quiz", quiz_id.value()))?;
        let lesson = self
            .catalog
            .get_lesson(quiz.lesson_id())
            .await?
            .ok_or_else(|| TrackingError::not_found("lesson", quiz.lesson_id().value()))?;
        let course_id = lesson.course_id();
        if self
            .enrollments
            .get_enrollment(student_id, course_id)
            .await?
            .is_none()
        {
            tracing::warn!(%course_id, "refusing quiz submission without enrollment");
            return Err(TrackingError::NotEnrolled {
                student_id,
                course_id,
            });
        }

        let grade = grading::grade(&quiz, &answers);
        let notification =
            NewNotification::quiz_graded(student_id, &quiz, grade.score, grade.passed);
        let attempt = NewQuizResult {
            student_id,
            quiz_id,
            score: grade.score,
            answers,
            completed_at: self.clock.now(),
        };

        let result = self
            .results
            .record_attempt(attempt, quiz.max_attempts(), notification)
            .await
            .map_err(|e| match e {
                StorageError::LimitReached { attempts, max } => {
                    tracing::warn!(attempts, max, "attempt limit reached");
                    TrackingError::AttemptLimitExceeded { attempts, max }
                }
                // The quiz row went away after it was read.
                StorageError::NotFound => TrackingError::not_found("quiz", quiz_id.value()),
                other => TrackingError::Storage(other),
            })?;

        tracing::info!(
            result_id = result.id,
            score = grade.score,
            passed = grade.passed,
            "quiz graded"
        );
        Ok(QuizSubmission {
            result_id: result.id,
            grade,
            result,
        })
    }

    /// Prior attempts for a student on a quiz, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` if repository access fails.
    pub async fn attempts(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizResult>, TrackingError> {
        Ok(self.results.results_for(student_id, quiz_id).await?)
    }
}
