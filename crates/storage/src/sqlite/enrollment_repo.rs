use chrono::{DateTime, Utc};
use course_core::model::{CourseId, Enrollment, NewNotification, StudentId};

use super::{
    SqliteRepository,
    mapping::{conn, fk_or_conn, id_i64, map_enrollment_row},
    notification_repo::insert_notification,
};
use crate::repository::{CompletionWrite, EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO enrollments (student_id, course_id, enrolled_at, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(student_id, course_id) DO NOTHING
            ",
        )
        .bind(id_i64("student_id", enrollment.student_id.value())?)
        .bind(id_i64("course_id", enrollment.course_id.value())?)
        .bind(enrollment.enrolled_at)
        .bind(enrollment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(fk_or_conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, course_id, enrolled_at, completed_at
            FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn complete_if_finished(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
        notification: NewNotification,
    ) -> Result<CompletionWrite, StorageError> {
        let student = id_i64("student_id", student_id.value())?;
        let course = id_i64("course_id", course_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // The guarded UPDATE is the first statement, so the count and the write
        // happen under the same write lock.
        let res = sqlx::query(
            r"
            UPDATE enrollments
            SET completed_at = ?3
            WHERE student_id = ?1
              AND course_id = ?2
              AND completed_at IS NULL
              AND (SELECT COUNT(*) FROM lessons WHERE course_id = ?2) > 0
              AND (SELECT COUNT(*) FROM lessons WHERE course_id = ?2) = (
                  SELECT COUNT(*)
                  FROM lesson_progress lp
                  JOIN lessons l ON l.id = lp.lesson_id
                  WHERE lp.student_id = ?1 AND l.course_id = ?2 AND lp.completed = 1
              )
            ",
        )
        .bind(student)
        .bind(course)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            tx.rollback().await.map_err(conn)?;
            return match self.get_enrollment(student_id, course_id).await? {
                Some(_) => Ok(CompletionWrite::Unchanged),
                None => Err(StorageError::NotFound),
            };
        }

        let notification_id = insert_notification(&mut tx, &notification, at).await?;
        tx.commit().await.map_err(conn)?;

        tracing::info!(%student_id, %course_id, notification_id, "enrollment completed");
        Ok(CompletionWrite::Transitioned {
            completed_at: at,
            notification_id,
        })
    }
}
