use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use course_core::model::{CourseId, CourseProgress, Enrollment, NewNotification, StudentId};
use storage::repository::{CatalogRepository, CompletionWrite, EnrollmentRepository, StorageError};

use crate::Clock;
use crate::error::TrackingError;
use crate::progress_calculator::CourseProgressCalculator;

/// Outcome of one completion evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvaluation {
    /// True only for the call that moved the enrollment to `COMPLETED`.
    pub transitioned: bool,
    pub progress: CourseProgress,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Certificate eligibility as implied by the enrollment's completion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateEligibility {
    pub eligible: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Enrollment> for CertificateEligibility {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            eligible: enrollment.is_certificate_eligible(),
            completed_at: enrollment.completed_at,
        }
    }
}

/// Moves enrollments to `COMPLETED` once every lesson is done.
///
/// The final check-and-set is delegated to
/// `EnrollmentRepository::complete_if_finished`, which re-counts lessons and
/// writes `completed_at` plus the `COURSE_COMPLETED` notification in one
/// atomic step. At most one caller per enrollment ever sees `transitioned`.
///
/// A completed enrollment is never re-validated, even if lessons are added to
/// the course later.
#[derive(Clone)]
pub struct CompletionPropagator {
    clock: Clock,
    calculator: CourseProgressCalculator,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl CompletionPropagator {
    #[must_use]
    pub fn new(
        clock: Clock,
        calculator: CourseProgressCalculator,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            calculator,
            catalog,
            enrollments,
        }
    }

    /// Evaluate the completion predicate and transition if it holds.
    ///
    /// Idempotent: once the enrollment is completed, later calls only report.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` if the course does not exist.
    /// Returns `TrackingError::NotEnrolled` if the student has no enrollment.
    /// Returns `TrackingError::Storage` if persistence fails.
    #[tracing::instrument(skip(self), fields(%student_id, %course_id))]
    pub async fn evaluate(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<CompletionEvaluation, TrackingError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or_else(|| TrackingError::not_found("course", course_id.value()))?;
        let enrollment = self.enrollment(student_id, course_id).await?;
        let progress = self
            .calculator
            .compute_progress(student_id, course_id)
            .await?;

        if enrollment.completed_at.is_some() || !progress.is_complete() {
            tracing::debug!(
                percentage = progress.percentage,
                completed = enrollment.completed_at.is_some(),
                "no completion transition"
            );
            return Ok(CompletionEvaluation {
                transitioned: false,
                progress,
                completed_at: enrollment.completed_at,
            });
        }

        let notification = NewNotification::course_completed(student_id, &course);
        let write = self
            .enrollments
            .complete_if_finished(student_id, course_id, self.clock.now(), notification)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => TrackingError::NotEnrolled {
                    student_id,
                    course_id,
                },
                other => TrackingError::Storage(other),
            })?;

        match write {
            CompletionWrite::Transitioned {
                completed_at,
                notification_id,
            } => {
                tracing::info!(%completed_at, notification_id, "course completed");
                Ok(CompletionEvaluation {
                    transitioned: true,
                    progress,
                    completed_at: Some(completed_at),
                })
            }
            CompletionWrite::Unchanged => {
                // Lost the race to a concurrent caller, or the guard saw fewer lessons done.
                let current = self.enrollment(student_id, course_id).await?;
                tracing::debug!("completion already recorded elsewhere");
                Ok(CompletionEvaluation {
                    transitioned: false,
                    progress,
                    completed_at: current.completed_at,
                })
            }
        }
    }

    /// Whether the student may be issued a certificate for the course.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotEnrolled` if the student has no enrollment.
    /// Returns `TrackingError::Storage` if repository access fails.
    pub async fn certificate_eligibility(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<CertificateEligibility, TrackingError> {
        let enrollment = self.enrollment(student_id, course_id).await?;
        Ok(CertificateEligibility::from(&enrollment))
    }

    async fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, TrackingError> {
        self.enrollments
            .get_enrollment(student_id, course_id)
            .await?
            .ok_or(TrackingError::NotEnrolled {
                student_id,
                course_id,
            })
    }
}
