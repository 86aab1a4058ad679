use std::sync::Arc;

use chrono::{DateTime, Utc};
use course_core::model::{
    AnswerOption, AnswerSheet, Course, CourseId, Enrollment, EnrollmentStatus, Lesson, LessonId,
    LessonProgress, NotificationKind, Question, QuestionId, Quiz, QuizId, StudentId,
};
use course_core::time::fixed_now;
use services::{AppServices, Clock, EventOutcome, InputEvent, TrackingError};
use storage::repository::{ProgressRepository, Storage, StorageError};

const STUDENT: StudentId = StudentId::new(11);
const COURSE: CourseId = CourseId::new(1);
const QUIZ: QuizId = QuizId::new(1);

async fn seed(storage: &Storage, lessons: u64, max_attempts: Option<u32>) {
    let course = Course::new(COURSE, "Fearless Concurrency").unwrap();
    storage.catalog.upsert_course(&course).await.unwrap();
    for n in 1..=lessons {
        let lesson = Lesson::new(
            LessonId::new(n),
            COURSE,
            format!("Lesson {n}"),
            u32::try_from(n).unwrap(),
        )
        .unwrap();
        storage.catalog.upsert_lesson(&lesson).await.unwrap();
    }
    let quiz = Quiz::new(
        QUIZ,
        LessonId::new(1),
        "Threads",
        70,
        max_attempts,
        vec![
            Question::new(QuestionId::new(1), AnswerOption::A, 1),
            Question::new(QuestionId::new(2), AnswerOption::B, 2),
            Question::new(QuestionId::new(3), AnswerOption::C, 3),
            Question::new(QuestionId::new(4), AnswerOption::D, 4),
        ],
    )
    .unwrap();
    storage.catalog.upsert_quiz(&quiz).await.unwrap();
    storage
        .enrollments
        .enroll(&Enrollment::new(STUDENT, COURSE, fixed_now()))
        .await
        .unwrap();
}

async fn in_memory(lessons: u64, max_attempts: Option<u32>) -> AppServices {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    seed(app.storage(), lessons, max_attempts).await;
    app
}

async fn on_disk(dir: &tempfile::TempDir, lessons: u64, max_attempts: Option<u32>) -> AppServices {
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("tracking.sqlite3").display()
    );
    let app = AppServices::new_sqlite(&url, Clock::fixed(fixed_now()))
        .await
        .expect("sqlite services");
    seed(app.storage(), lessons, max_attempts).await;
    app
}

fn answers(picks: &[(u64, &str)]) -> AnswerSheet {
    picks
        .iter()
        .map(|(q, a)| (QuestionId::new(*q), (*a).to_owned()))
        .collect()
}

async fn course_completed_count(app: &AppServices) -> usize {
    app.notifications()
        .list_for_user(STUDENT, 50)
        .await
        .unwrap()
        .iter()
        .filter(|n| n.content.kind == NotificationKind::CourseCompleted)
        .count()
}

#[tokio::test]
async fn two_lesson_course_completes_on_second_lesson() {
    let app = in_memory(2, None).await;

    let first = app
        .events()
        .handle(InputEvent::LessonCompleted {
            student_id: STUDENT,
            lesson_id: LessonId::new(1),
        })
        .await
        .unwrap();
    let EventOutcome::LessonCompleted { evaluation, .. } = first else {
        panic!("expected lesson outcome");
    };
    assert_eq!(evaluation.progress.percentage, 50);
    assert!(!evaluation.transitioned);
    let enrollment = app
        .storage()
        .enrollments
        .get_enrollment(STUDENT, COURSE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.status(), EnrollmentStatus::InProgress);

    let second = app
        .events()
        .handle_json(r#"{"type":"lessonCompleted","studentId":11,"lessonId":2}"#)
        .await
        .unwrap();
    let EventOutcome::LessonCompleted { evaluation, .. } = second else {
        panic!("expected lesson outcome");
    };
    assert_eq!(evaluation.progress.percentage, 100);
    assert!(evaluation.transitioned);

    let enrollment = app
        .storage()
        .enrollments
        .get_enrollment(STUDENT, COURSE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
    assert_eq!(course_completed_count(&app).await, 1);

    let snapshot = app.calculator().snapshot(STUDENT, COURSE).await.unwrap();
    assert!(snapshot.per_lesson.iter().all(|l| l.completed));
    assert!(
        app.propagator()
            .certificate_eligibility(STUDENT, COURSE)
            .await
            .unwrap()
            .eligible
    );
}

#[tokio::test]
async fn repeating_the_last_lesson_never_refires_completion() {
    let app = in_memory(1, None).await;
    let event = InputEvent::LessonCompleted {
        student_id: STUDENT,
        lesson_id: LessonId::new(1),
    };

    for _ in 0..3 {
        app.events().handle(event.clone()).await.unwrap();
    }

    let enrollment = app
        .storage()
        .enrollments
        .get_enrollment(STUDENT, COURSE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.completed_at, Some(fixed_now()));
    assert_eq!(course_completed_count(&app).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_last_lesson_completions_notify_once_in_memory() {
    let app = in_memory(3, None).await;
    app.ledger()
        .mark_lesson_complete(STUDENT, LessonId::new(1))
        .await
        .unwrap();
    app.ledger()
        .mark_lesson_complete(STUDENT, LessonId::new(2))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.events()
                .handle(InputEvent::LessonCompleted {
                    student_id: STUDENT,
                    lesson_id: LessonId::new(3),
                })
                .await
        }));
    }

    let mut transitions = 0;
    for handle in handles {
        if let EventOutcome::LessonCompleted { evaluation, .. } = handle.await.unwrap().unwrap() {
            if evaluation.transitioned {
                transitions += 1;
            }
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(course_completed_count(&app).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_final_lessons_notify_once_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = on_disk(&dir, 3, None).await;
    app.ledger()
        .mark_lesson_complete(STUDENT, LessonId::new(1))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for lesson in [2_u64, 3, 2, 3] {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.events()
                .handle(InputEvent::LessonCompleted {
                    student_id: STUDENT,
                    lesson_id: LessonId::new(lesson),
                })
                .await
        }));
    }

    let mut transitions = 0;
    for handle in handles {
        if let EventOutcome::LessonCompleted { evaluation, .. } = handle.await.unwrap().unwrap() {
            if evaluation.transitioned {
                transitions += 1;
            }
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(course_completed_count(&app).await, 1);

    let progress = app
        .calculator()
        .compute_progress(STUDENT, COURSE)
        .await
        .unwrap();
    assert_eq!(progress.percentage, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_attempt_limit_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = on_disk(&dir, 1, Some(2)).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.grader()
                .submit(STUDENT, QUIZ, answers(&[(1, "A"), (2, "B"), (3, "A"), (4, "D")]))
                .await
        }));
    }

    let mut accepted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(submission) => {
                assert_eq!(submission.grade.score, 75);
                accepted += 1;
            }
            Err(TrackingError::AttemptLimitExceeded { max: 2, .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((accepted, refused), (2, 3));
    assert_eq!(app.grader().attempts(STUDENT, QUIZ).await.unwrap().len(), 2);
}

#[tokio::test]
async fn quiz_event_returns_result_shape() {
    let app = in_memory(1, None).await;

    let outcome = app
        .events()
        .handle_json(
            r#"{"type":"quizSubmitted","studentId":11,"quizId":1,
                "answers":{"1":"a","2":"B","3":"A","4":" d "}}"#,
        )
        .await
        .unwrap();
    let EventOutcome::QuizGraded { submission } = &outcome else {
        panic!("expected quiz outcome");
    };
    assert_eq!(submission.grade.correct_count, 3);
    assert!(submission.grade.passed);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["type"], "quizGraded");
    assert_eq!(json["submission"]["score"], 75);
    assert_eq!(json["submission"]["resultId"], submission.result_id);
}

#[tokio::test]
async fn malformed_event_writes_nothing() {
    let app = in_memory(1, None).await;

    let err = app
        .events()
        .handle_json(r#"{"type":"quizSubmitted","studentId":11,"quizId":1,"answers":"A"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::InvalidInput(_)));
    assert!(app.grader().attempts(STUDENT, QUIZ).await.unwrap().is_empty());
    assert!(
        app.notifications()
            .list_for_user(STUDENT, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

struct BrokenProgress;

#[async_trait::async_trait]
impl ProgressRepository for BrokenProgress {
    async fn upsert_completion(
        &self,
        _student_id: StudentId,
        _lesson_id: LessonId,
        _at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }

    async fn get_progress(
        &self,
        _student_id: StudentId,
        _lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }

    async fn progress_for_course(
        &self,
        _student_id: StudentId,
        _course_id: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }

    async fn count_completed(
        &self,
        _student_id: StudentId,
        _course_id: CourseId,
    ) -> Result<u32, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }
}

#[tokio::test]
async fn storage_failures_surface_as_internal_errors() {
    let healthy = Storage::in_memory();
    seed(&healthy, 1, None).await;
    let storage = Storage {
        progress: Arc::new(BrokenProgress),
        ..healthy
    };
    let app = AppServices::new(storage, Clock::fixed(fixed_now()));

    let err = app
        .ledger()
        .mark_lesson_complete(STUDENT, LessonId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Storage(StorageError::Connection(_))));
    assert_eq!(err.code(), "INTERNAL");
}
