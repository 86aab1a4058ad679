use course_core::model::{NewNotification, QuizId, QuizResult, StudentId};

use super::{
    SqliteRepository,
    mapping::{answers_to_json, conn, count_col, fk_or_conn, id_i64, map_result_row},
    notification_repo::insert_notification,
};
use crate::repository::{NewQuizResult, QuizResultRepository, StorageError};

#[async_trait::async_trait]
impl QuizResultRepository for SqliteRepository {
    async fn record_attempt(
        &self,
        result: NewQuizResult,
        max_attempts: Option<u32>,
        notification: NewNotification,
    ) -> Result<QuizResult, StorageError> {
        let student = id_i64("student_id", result.student_id.value())?;
        let quiz = id_i64("quiz_id", result.quiz_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Insert only while attempts remain; the count runs inside the write.
        let res = sqlx::query(
            r"
            INSERT INTO quiz_results (student_id, quiz_id, score, answers, completed_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE ?6 IS NULL
               OR (SELECT COUNT(*) FROM quiz_results WHERE student_id = ?1 AND quiz_id = ?2) < ?6
            ",
        )
        .bind(student)
        .bind(quiz)
        .bind(i64::from(result.score))
        .bind(answers_to_json(&result.answers)?)
        .bind(result.completed_at)
        .bind(max_attempts.map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(fk_or_conn)?;

        if res.rows_affected() == 0 {
            tx.rollback().await.map_err(conn)?;
            let attempts = self.count_attempts(result.student_id, result.quiz_id).await?;
            return Err(StorageError::LimitReached {
                attempts,
                max: max_attempts.unwrap_or(attempts),
            });
        }
        let id = res.last_insert_rowid();

        insert_notification(&mut tx, &notification, result.completed_at).await?;
        tx.commit().await.map_err(conn)?;

        Ok(result.with_id(id))
    }

    async fn count_attempts(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count
            FROM quiz_results
            WHERE student_id = ?1 AND quiz_id = ?2
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        count_col(&row)
    }

    async fn results_for(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, student_id, quiz_id, score, answers, completed_at
            FROM quiz_results
            WHERE student_id = ?1 AND quiz_id = ?2
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_result_row).collect()
    }
}
