use course_core::model::{
    AnswerOption, AnswerSheet, Course, CourseId, Enrollment, Lesson, LessonId, LessonProgress,
    NewNotification, Notification, NotificationKind, Question, QuestionId, QuizId, QuizResult,
    StudentId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Foreign-key violations mean the parent row is missing.
pub(crate) fn fk_or_conn(e: sqlx::Error) -> StorageError {
    let missing_parent =
        matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
    if missing_parent {
        StorageError::NotFound
    } else {
        conn(e)
    }
}

/// Ids are `u64` in the domain and `INTEGER` (i64) in `SQLite`.
pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u32_col(row: &SqliteRow, col: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(col, row.try_get::<i64, _>(col).map_err(ser)?)
}

fn u64_col(row: &SqliteRow, col: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(col, row.try_get::<i64, _>(col).map_err(ser)?)
}

pub(crate) fn count_col(row: &SqliteRow) -> Result<u32, StorageError> {
    u32_col(row, "count")
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    Course::new(
        CourseId::new(u64_col(row, "id")?),
        row.try_get::<String, _>("title").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    Lesson::new(
        LessonId::new(u64_col(row, "id")?),
        CourseId::new(u64_col(row, "course_id")?),
        row.try_get::<String, _>("title").map_err(ser)?,
        u32_col(row, "position")?,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let raw: String = row.try_get("correct_option").map_err(ser)?;
    let correct_option: AnswerOption = raw.parse().map_err(ser)?;
    Ok(Question::new(
        QuestionId::new(u64_col(row, "id")?),
        correct_option,
        u32_col(row, "position")?,
    ))
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment {
        student_id: StudentId::new(u64_col(row, "student_id")?),
        course_id: CourseId::new(u64_col(row, "course_id")?),
        enrolled_at: row.try_get("enrolled_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress {
        student_id: StudentId::new(u64_col(row, "student_id")?),
        lesson_id: LessonId::new(u64_col(row, "lesson_id")?),
        completed: row.try_get("completed").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn answers_to_json(answers: &AnswerSheet) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<QuizResult, StorageError> {
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    Ok(QuizResult {
        id: row.try_get("id").map_err(ser)?,
        student_id: StudentId::new(u64_col(row, "student_id")?),
        quiz_id: QuizId::new(u64_col(row, "quiz_id")?),
        score: u32_col(row, "score")?,
        answers: serde_json::from_str(&answers_json).map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_notification_row(row: &SqliteRow) -> Result<Notification, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    Ok(Notification {
        id: row.try_get("id").map_err(ser)?,
        content: NewNotification {
            user_id: StudentId::new(u64_col(row, "user_id")?),
            kind: NotificationKind::parse(&kind).map_err(ser)?,
            title: row.try_get("title").map_err(ser)?,
            message: row.try_get("message").map_err(ser)?,
            related_id: u64_col(row, "related_id")?,
            link: row.try_get("link").map_err(ser)?,
        },
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
