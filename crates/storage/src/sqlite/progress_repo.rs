use chrono::{DateTime, Utc};
use course_core::model::{CourseId, LessonId, LessonProgress, StudentId};

use super::{
    SqliteRepository,
    mapping::{conn, count_col, fk_or_conn, id_i64, map_progress_row},
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_completion(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO lesson_progress (student_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(student_id, lesson_id) DO UPDATE SET
                completed = 1,
                completed_at = excluded.completed_at
            RETURNING student_id, lesson_id, completed, completed_at
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(fk_or_conn)?;

        map_progress_row(&row)
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, lesson_id, completed, completed_at
            FROM lesson_progress
            WHERE student_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lp.student_id, lp.lesson_id, lp.completed, lp.completed_at
            FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE lp.student_id = ?1 AND l.course_id = ?2
            ORDER BY l.position ASC, l.id ASC
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn count_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count
            FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE lp.student_id = ?1 AND l.course_id = ?2 AND lp.completed = 1
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        count_col(&row)
    }
}
