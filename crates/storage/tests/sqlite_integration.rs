use std::sync::Arc;

use chrono::Duration;
use course_core::model::{
    AnswerOption, AnswerSheet, Course, CourseId, Enrollment, Lesson, LessonId, NewNotification,
    NotificationKind, Question, QuestionId, Quiz, QuizId, StudentId,
};
use course_core::time::fixed_now;
use storage::repository::{
    CatalogRepository, CompletionWrite, EnrollmentRepository, NewQuizResult,
    NotificationRepository, ProgressRepository, QuizResultRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

const STUDENT: StudentId = StudentId::new(7);
const COURSE: CourseId = CourseId::new(1);

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn seed_course(repo: &SqliteRepository, lessons: u64) -> Course {
    let course = Course::new(COURSE, "Ownership").unwrap();
    repo.upsert_course(&course).await.unwrap();
    for id in 1..=lessons {
        let lesson = Lesson::new(
            LessonId::new(id),
            COURSE,
            format!("Lesson {id}"),
            u32::try_from(id).unwrap(),
        )
        .unwrap();
        repo.upsert_lesson(&lesson).await.unwrap();
    }
    repo.enroll(&Enrollment::new(STUDENT, COURSE, fixed_now()))
        .await
        .unwrap();
    course
}

#[tokio::test]
async fn sqlite_catalog_round_trips_quiz_with_ordered_questions() {
    let repo = connect("memdb_catalog").await;
    seed_course(&repo, 2).await;

    let quiz = Quiz::new(
        QuizId::new(3),
        LessonId::new(2),
        "Borrowing",
        70,
        Some(2),
        vec![
            Question::new(QuestionId::new(11), AnswerOption::D, 2),
            Question::new(QuestionId::new(10), AnswerOption::A, 1),
        ],
    )
    .unwrap();
    repo.upsert_quiz(&quiz).await.unwrap();

    let fetched = repo.get_quiz(quiz.id()).await.unwrap().expect("quiz");
    assert_eq!(fetched, quiz);
    assert_eq!(fetched.questions()[0].id, QuestionId::new(10));

    let lessons = repo.lessons_for_course(COURSE).await.unwrap();
    assert_eq!(lessons.len(), 2);
    assert_eq!(lessons[0].title(), "Lesson 1");
    assert!(repo.get_quiz(QuizId::new(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_enroll_twice_conflicts() {
    let repo = connect("memdb_enroll").await;
    seed_course(&repo, 1).await;

    let err = repo
        .enroll(&Enrollment::new(STUDENT, COURSE, fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn sqlite_upsert_completion_is_idempotent() {
    let repo = connect("memdb_upsert").await;
    seed_course(&repo, 2).await;
    let later = fixed_now() + Duration::minutes(3);

    repo.upsert_completion(STUDENT, LessonId::new(1), fixed_now())
        .await
        .unwrap();
    let row = repo
        .upsert_completion(STUDENT, LessonId::new(1), later)
        .await
        .unwrap();

    assert!(row.completed);
    assert_eq!(row.completed_at, Some(later));
    assert_eq!(
        repo.progress_for_course(STUDENT, COURSE).await.unwrap().len(),
        1
    );
    assert_eq!(repo.count_completed(STUDENT, COURSE).await.unwrap(), 1);
}

#[tokio::test]
async fn sqlite_completion_is_guarded_and_single() {
    let repo = connect("memdb_completion").await;
    let course = seed_course(&repo, 2).await;
    let note = NewNotification::course_completed(STUDENT, &course);

    repo.upsert_completion(STUDENT, LessonId::new(1), fixed_now())
        .await
        .unwrap();
    let early = repo
        .complete_if_finished(STUDENT, COURSE, fixed_now(), note.clone())
        .await
        .unwrap();
    assert_eq!(early, CompletionWrite::Unchanged);

    repo.upsert_completion(STUDENT, LessonId::new(2), fixed_now())
        .await
        .unwrap();
    let done = repo
        .complete_if_finished(STUDENT, COURSE, fixed_now(), note.clone())
        .await
        .unwrap();
    assert!(matches!(done, CompletionWrite::Transitioned { .. }));

    let later = fixed_now() + Duration::days(1);
    let again = repo
        .complete_if_finished(STUDENT, COURSE, later, note)
        .await
        .unwrap();
    assert_eq!(again, CompletionWrite::Unchanged);

    let enrollment = repo.get_enrollment(STUDENT, COURSE).await.unwrap().unwrap();
    assert_eq!(enrollment.completed_at, Some(fixed_now()));

    let notes = repo.list_for_user(STUDENT, 10).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].content.kind, NotificationKind::CourseCompleted);
}

#[tokio::test]
async fn sqlite_completion_without_enrollment_is_not_found() {
    let repo = connect("memdb_completion_missing").await;
    let course = seed_course(&repo, 1).await;
    let stranger = StudentId::new(99);

    let err = repo
        .complete_if_finished(
            stranger,
            COURSE,
            fixed_now(),
            NewNotification::course_completed(stranger, &course),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_attempts_stop_at_limit() {
    let repo = connect("memdb_attempts").await;
    seed_course(&repo, 1).await;
    let quiz = Quiz::new(
        QuizId::new(4),
        LessonId::new(1),
        "Lifetimes",
        50,
        Some(2),
        vec![Question::new(QuestionId::new(1), AnswerOption::B, 0)],
    )
    .unwrap();
    repo.upsert_quiz(&quiz).await.unwrap();

    let mut answers = AnswerSheet::new();
    answers.insert(QuestionId::new(1), "B".into());
    let attempt = NewQuizResult {
        student_id: STUDENT,
        quiz_id: quiz.id(),
        score: 100,
        answers,
        completed_at: fixed_now(),
    };
    let note = NewNotification::quiz_graded(STUDENT, &quiz, 100, true);

    for _ in 0..2 {
        repo.record_attempt(attempt.clone(), quiz.max_attempts(), note.clone())
            .await
            .unwrap();
    }
    let err = repo
        .record_attempt(attempt, quiz.max_attempts(), note)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::LimitReached { attempts: 2, max: 2 }));

    let results = repo.results_for(STUDENT, quiz.id()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].answers.get(&QuestionId::new(1)).unwrap(), "B");
    assert_eq!(repo.list_for_user(STUDENT, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_outbox_lists_newest_first_per_user() {
    let repo = connect("memdb_outbox_order").await;
    let course = seed_course(&repo, 1).await;
    let quiz = Quiz::new(
        QuizId::new(6),
        LessonId::new(1),
        "Borrowing",
        50,
        None,
        vec![Question::new(QuestionId::new(1), AnswerOption::A, 0)],
    )
    .unwrap();
    repo.upsert_quiz(&quiz).await.unwrap();

    repo.record_attempt(
        NewQuizResult {
            student_id: STUDENT,
            quiz_id: quiz.id(),
            score: 0,
            answers: AnswerSheet::new(),
            completed_at: fixed_now(),
        },
        quiz.max_attempts(),
        NewNotification::quiz_graded(STUDENT, &quiz, 0, false),
    )
    .await
    .unwrap();
    repo.upsert_completion(STUDENT, LessonId::new(1), fixed_now())
        .await
        .unwrap();
    repo.complete_if_finished(
        STUDENT,
        COURSE,
        fixed_now() + Duration::minutes(1),
        NewNotification::course_completed(STUDENT, &course),
    )
    .await
    .unwrap();

    let notes = repo.list_for_user(STUDENT, 10).await.unwrap();
    let kinds: Vec<_> = notes.iter().map(|n| n.content.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::CourseCompleted, NotificationKind::QuizGraded]
    );
    assert_eq!(notes[0].content.related_id, COURSE.value());

    let latest = repo.list_for_user(STUDENT, 1).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, notes[0].id);
    assert!(
        repo.list_for_user(StudentId::new(8), 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_attempt_for_missing_quiz_is_not_found() {
    let repo = connect("memdb_attempt_missing_quiz").await;
    seed_course(&repo, 1).await;
    let ghost = Quiz::new(
        QuizId::new(77),
        LessonId::new(1),
        "Deleted",
        50,
        None,
        vec![Question::new(QuestionId::new(1), AnswerOption::A, 0)],
    )
    .unwrap();

    let err = repo
        .record_attempt(
            NewQuizResult {
                student_id: STUDENT,
                quiz_id: ghost.id(),
                score: 100,
                answers: AnswerSheet::new(),
                completed_at: fixed_now(),
            },
            None,
            NewNotification::quiz_graded(STUDENT, &ghost, 100, true),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert!(repo.list_for_user(STUDENT, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_racing_completions_fire_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("race.sqlite3").display()
    );
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    let course = seed_course(&repo, 2).await;

    let repo = Arc::new(repo);
    let mut handles = Vec::new();
    for lesson in [1_u64, 2] {
        let repo = Arc::clone(&repo);
        let note = NewNotification::course_completed(STUDENT, &course);
        handles.push(tokio::spawn(async move {
            repo.upsert_completion(STUDENT, LessonId::new(lesson), fixed_now())
                .await?;
            repo.complete_if_finished(STUDENT, COURSE, fixed_now(), note)
                .await
        }));
    }

    let mut transitions = 0;
    for handle in handles {
        if let CompletionWrite::Transitioned { .. } = handle.await.unwrap().unwrap() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(repo.list_for_user(STUDENT, 10).await.unwrap().len(), 1);
}
