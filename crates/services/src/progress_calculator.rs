use std::sync::Arc;

use course_core::model::{CourseId, CourseProgress, ProgressSnapshot, StudentId};
use storage::repository::{CatalogRepository, ProgressRepository};

use crate::error::TrackingError;

/// Derives aggregate progress for a (student, course) pair. Read-only.
#[derive(Clone)]
pub struct CourseProgressCalculator {
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl CourseProgressCalculator {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { catalog, progress }
    }

    /// Count lessons and completed lessons and derive the percentage.
    ///
    /// A course with no lessons (including one that does not exist) reports
    /// `0%` rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` if repository access fails.
    #[tracing::instrument(skip(self), fields(%student_id, %course_id))]
    pub async fn compute_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<CourseProgress, TrackingError> {
        let lessons = self.catalog.lessons_for_course(course_id).await?;
        let total = u32::try_from(lessons.len()).unwrap_or(u32::MAX);
        let completed = self.progress.count_completed(student_id, course_id).await?;
        Ok(CourseProgress::from_counts(total, completed))
    }

    /// Progress plus one entry per lesson, in lesson order.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` if the course does not exist.
    /// Returns `TrackingError::Storage` if repository access fails.
    #[tracing::instrument(skip(self), fields(%student_id, %course_id))]
    pub async fn snapshot(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<ProgressSnapshot, TrackingError> {
        if self.catalog.get_course(course_id).await?.is_none() {
            return Err(TrackingError::not_found("course", course_id.value()));
        }
        let lessons = self.catalog.lessons_for_course(course_id).await?;
        let rows = self
            .progress
            .progress_for_course(student_id, course_id)
            .await?;
        Ok(ProgressSnapshot::build(&lessons, &rows))
    }
}
