use course_core::model::{Course, CourseId, Lesson, LessonId, Quiz, QuizId};

use super::{
    SqliteRepository,
    mapping::{
        conn, fk_or_conn, id_i64, map_course_row, map_lesson_row, map_question_row, ser,
        u32_from_i64,
    },
};
use crate::repository::{CatalogRepository, StorageError};
use sqlx::Row;

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(id_i64("course_id", course.id().value())?)
        .bind(course.title())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query("SELECT id, title FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_course_row).transpose()
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (id, course_id, title, position)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                position = excluded.position
            ",
        )
        .bind(id_i64("lesson_id", lesson.id().value())?)
        .bind(id_i64("course_id", lesson.course_id().value())?)
        .bind(lesson.title())
        .bind(i64::from(lesson.order()))
        .execute(&self.pool)
        .await
        .map_err(fk_or_conn)?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let row = sqlx::query("SELECT id, course_id, title, position FROM lessons WHERE id = ?1")
            .bind(id_i64("lesson_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, position
            FROM lessons
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_lesson_row).collect()
    }

    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let quiz_id = id_i64("quiz_id", quiz.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO quizzes (id, lesson_id, title, passing_score, max_attempts)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                lesson_id = excluded.lesson_id,
                title = excluded.title,
                passing_score = excluded.passing_score,
                max_attempts = excluded.max_attempts
            ",
        )
        .bind(quiz_id)
        .bind(id_i64("lesson_id", quiz.lesson_id().value())?)
        .bind(quiz.title())
        .bind(i64::from(quiz.passing_score()))
        .bind(quiz.max_attempts().map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(fk_or_conn)?;

        // The question set is replaced wholesale.
        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for question in quiz.questions() {
            sqlx::query(
                r"
                INSERT INTO questions (id, quiz_id, correct_option, position)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id_i64("question_id", question.id.value())?)
            .bind(quiz_id)
            .bind(question.correct_option.as_str())
            .bind(i64::from(question.order))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let quiz_id = id_i64("quiz_id", id.value())?;
        let Some(row) = sqlx::query(
            r"
            SELECT id, lesson_id, title, passing_score, max_attempts
            FROM quizzes
            WHERE id = ?1
            ",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let question_rows = sqlx::query(
            r"
            SELECT id, correct_option, position
            FROM questions
            WHERE quiz_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        let questions = question_rows
            .iter()
            .map(map_question_row)
            .collect::<Result<Vec<_>, _>>()?;

        let lesson_id: i64 = row.try_get("lesson_id").map_err(ser)?;
        let max_attempts = row
            .try_get::<Option<i64>, _>("max_attempts")
            .map_err(ser)?
            .map(|v| u32_from_i64("max_attempts", v))
            .transpose()?;

        Quiz::new(
            id,
            LessonId::new(u64::try_from(lesson_id).map_err(ser)?),
            row.try_get::<String, _>("title").map_err(ser)?,
            u32_from_i64(
                "passing_score",
                row.try_get::<i64, _>("passing_score").map_err(ser)?,
            )?,
            max_attempts,
            questions,
        )
        .map(Some)
        .map_err(ser)
    }
}
