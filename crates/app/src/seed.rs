use anyhow::Context;
use serde_json::{Value, json};

use course_core::model::{
    AnswerOption, Course, CourseId, Enrollment, Lesson, LessonId, Question, QuestionId, Quiz,
    QuizId, StudentId,
};
use services::{AppServices, Clock};
use storage::repository::StorageError;

const DEMO_COURSE: CourseId = CourseId::new(1);
const DEMO_STUDENT: StudentId = StudentId::new(1);
const DEMO_QUIZ: QuizId = QuizId::new(1);

const LESSONS: [&str; 3] = ["Ownership", "Borrowing", "Lifetimes"];

/// Upsert the demo catalog and enroll the demo student. Safe to rerun.
pub async fn run(app: &AppServices, clock: Clock) -> anyhow::Result<Value> {
    let storage = app.storage();

    let course = Course::new(DEMO_COURSE, "Introducción a Rust")?;
    storage.catalog.upsert_course(&course).await?;

    let mut lesson_ids = Vec::with_capacity(LESSONS.len());
    for (id, title) in (1_u64..).zip(LESSONS) {
        let order = u32::try_from(id).context("lesson order overflow")?;
        let lesson = Lesson::new(LessonId::new(id), DEMO_COURSE, title, order)?;
        storage.catalog.upsert_lesson(&lesson).await?;
        lesson_ids.push(lesson.id());
    }

    let key = [AnswerOption::B, AnswerOption::A, AnswerOption::D, AnswerOption::C];
    let questions = (1_u64..)
        .zip(key)
        .map(|(id, option)| -> anyhow::Result<Question> {
            Ok(Question::new(QuestionId::new(id), option, u32::try_from(id)?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let quiz = Quiz::new(
        DEMO_QUIZ,
        LessonId::new(3),
        "Repaso de ownership",
        70,
        Some(3),
        questions,
    )?;
    storage.catalog.upsert_quiz(&quiz).await?;

    match storage
        .enrollments
        .enroll(&Enrollment::new(DEMO_STUDENT, DEMO_COURSE, clock.now()))
        .await
    {
        Ok(()) => tracing::info!(student_id = %DEMO_STUDENT, "demo student enrolled"),
        Err(StorageError::Conflict) => {
            tracing::debug!(student_id = %DEMO_STUDENT, "demo student already enrolled");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(json!({
        "courseId": DEMO_COURSE,
        "lessonIds": lesson_ids,
        "quizId": DEMO_QUIZ,
        "studentId": DEMO_STUDENT,
    }))
}
