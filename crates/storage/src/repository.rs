use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    AnswerSheet, Course, CourseId, Enrollment, Lesson, LessonId, LessonProgress, NewNotification,
    Notification, Quiz, QuizId, QuizResult, StudentId, sort_lessons,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("attempt limit reached ({attempts} of {max})")]
    LimitReached { attempts: u32, max: u32 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// A quiz attempt ready to be appended; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizResult {
    pub student_id: StudentId,
    pub quiz_id: QuizId,
    pub score: u32,
    pub answers: AnswerSheet,
    pub completed_at: DateTime<Utc>,
}

impl NewQuizResult {
    #[must_use]
    pub fn with_id(self, id: i64) -> QuizResult {
        QuizResult {
            id,
            student_id: self.student_id,
            quiz_id: self.quiz_id,
            score: self.score,
            answers: self.answers,
            completed_at: self.completed_at,
        }
    }
}

/// What a guarded completion write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionWrite {
    /// `completed_at` was set by this call and the notification stored.
    Transitioned {
        completed_at: DateTime<Utc>,
        notification_id: i64,
    },
    /// Nothing was written: already completed, or lessons still outstanding.
    Unchanged,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read access to courses, lessons and quizzes.
///
/// The `upsert_*` methods exist for seeding and fixtures; authoring is handled
/// elsewhere.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID. Returns `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson's course does not exist.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// Lessons of a course in course order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError>;

    /// Store a quiz, replacing its question set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quiz's lesson does not exist.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Insert a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the student is already enrolled,
    /// `StorageError::NotFound` if the course does not exist.
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Set `completed_at` if, and only if, it is still unset and every lesson
    /// of the course is completed by the student. The notification is stored in
    /// the same atomic step as the transition, so at most one is ever written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such enrollment.
    async fn complete_if_finished(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
        notification: NewNotification,
    ) -> Result<CompletionWrite, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Idempotent completion upsert keyed by (student, lesson).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn upsert_completion(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_progress(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// All progress rows the student has for lessons of the course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError>;

    /// Number of completed lessons of the course for the student.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn count_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait QuizResultRepository: Send + Sync {
    /// Append an attempt unless the student already used `max_attempts`, and
    /// store its notification alongside.
    ///
    /// The limit check and the insert are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LimitReached` when no attempts remain; nothing is written.
    async fn record_attempt(
        &self,
        result: NewQuizResult,
        max_attempts: Option<u32>,
        notification: NewNotification,
    ) -> Result<QuizResult, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn count_attempts(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError>;

    /// Attempts oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn results_for(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizResult>, StorageError>;
}

/// Read side of the notification outbox. Rows are only written together with
/// the completion or quiz attempt they report.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_for_user(
        &self,
        user_id: StudentId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    courses: HashMap<CourseId, Course>,
    lessons: HashMap<LessonId, Lesson>,
    quizzes: HashMap<QuizId, Quiz>,
    enrollments: HashMap<(StudentId, CourseId), Enrollment>,
    progress: HashMap<(StudentId, LessonId), LessonProgress>,
    results: Vec<QuizResult>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn lesson_ids(&self, course_id: CourseId) -> Vec<LessonId> {
        self.lessons
            .values()
            .filter(|l| l.course_id() == course_id)
            .map(Lesson::id)
            .collect()
    }

    fn completed_count(&self, student_id: StudentId, course_id: CourseId) -> usize {
        self.lesson_ids(course_id)
            .into_iter()
            .filter(|lesson_id| {
                self.progress
                    .get(&(student_id, *lesson_id))
                    .is_some_and(|p| p.completed)
            })
            .count()
    }

    fn push_notification(&mut self, content: NewNotification, at: DateTime<Utc>) -> i64 {
        let id = next_id(self.notifications.len());
        self.notifications.push(Notification {
            id,
            content,
            created_at: at,
        });
        id
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).map_or(i64::MAX, |n| n + 1)
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Every table sits behind one mutex, so each trait method is a single
/// critical section.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        self.lock()?.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&lesson.course_id()) {
            return Err(StorageError::NotFound);
        }
        guard.lessons.insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        Ok(self.lock()?.lessons.get(&id).cloned())
    }

    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let guard = self.lock()?;
        let mut lessons: Vec<Lesson> = guard
            .lessons
            .values()
            .filter(|l| l.course_id() == course_id)
            .cloned()
            .collect();
        sort_lessons(&mut lessons);
        Ok(lessons)
    }

    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.lessons.contains_key(&quiz.lesson_id()) {
            return Err(StorageError::NotFound);
        }
        guard.quizzes.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        Ok(self.lock()?.quizzes.get(&id).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&enrollment.course_id) {
            return Err(StorageError::NotFound);
        }
        let key = (enrollment.student_id, enrollment.course_id);
        if guard.enrollments.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.enrollments.insert(key, enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(self
            .lock()?
            .enrollments
            .get(&(student_id, course_id))
            .cloned())
    }

    async fn complete_if_finished(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
        notification: NewNotification,
    ) -> Result<CompletionWrite, StorageError> {
        let mut guard = self.lock()?;

        let already = guard
            .enrollments
            .get(&(student_id, course_id))
            .ok_or(StorageError::NotFound)?
            .completed_at
            .is_some();
        let total = guard.lesson_ids(course_id).len();
        let done = guard.completed_count(student_id, course_id);
        if already || total == 0 || done != total {
            return Ok(CompletionWrite::Unchanged);
        }

        if let Some(enrollment) = guard.enrollments.get_mut(&(student_id, course_id)) {
            enrollment.completed_at = Some(at);
        }
        let notification_id = guard.push_notification(notification, at);
        Ok(CompletionWrite::Transitioned {
            completed_at: at,
            notification_id,
        })
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_completion(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let mut guard = self.lock()?;
        let row = guard
            .progress
            .entry((student_id, lesson_id))
            .and_modify(|p| p.mark_complete(at))
            .or_insert_with(|| LessonProgress::completed(student_id, lesson_id, at));
        Ok(row.clone())
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        Ok(self.lock()?.progress.get(&(student_id, lesson_id)).cloned())
    }

    async fn progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .lesson_ids(course_id)
            .into_iter()
            .filter_map(|lesson_id| guard.progress.get(&(student_id, lesson_id)).cloned())
            .collect())
    }

    async fn count_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        Ok(to_u32(self.lock()?.completed_count(student_id, course_id)))
    }
}

#[async_trait]
impl QuizResultRepository for InMemoryRepository {
    async fn record_attempt(
        &self,
        result: NewQuizResult,
        max_attempts: Option<u32>,
        notification: NewNotification,
    ) -> Result<QuizResult, StorageError> {
        let mut guard = self.lock()?;
        let used = to_u32(
            guard
                .results
                .iter()
                .filter(|r| r.student_id == result.student_id && r.quiz_id == result.quiz_id)
                .count(),
        );
        if let Some(max) = max_attempts {
            if used >= max {
                return Err(StorageError::LimitReached {
                    attempts: used,
                    max,
                });
            }
        }

        let at = result.completed_at;
        let stored = result.with_id(next_id(guard.results.len()));
        guard.results.push(stored.clone());
        guard.push_notification(notification, at);
        Ok(stored)
    }

    async fn count_attempts(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        Ok(to_u32(
            guard
                .results
                .iter()
                .filter(|r| r.student_id == student_id && r.quiz_id == quiz_id)
                .count(),
        ))
    }

    async fn results_for(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .results
            .iter()
            .filter(|r| r.student_id == student_id && r.quiz_id == quiz_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryRepository {
    async fn list_for_user(
        &self,
        user_id: StudentId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError> {
        let guard = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .notifications
            .iter()
            .rev()
            .filter(|n| n.content.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub quiz_results: Arc<dyn QuizResultRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one adapter value for every repository handle.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CatalogRepository
            + EnrollmentRepository
            + ProgressRepository
            + QuizResultRepository
            + NotificationRepository
            + Clone
            + 'static,
    {
        Self {
            catalog: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            quiz_results: Arc::new(repo.clone()),
            notifications: Arc::new(repo),
        }
    }
}
