mod course;
mod enrollment;
mod ids;
mod notification;
pub(crate) mod progress;
mod quiz;

pub use ids::{CourseId, LessonId, ParseIdError, QuestionId, QuizId, StudentId};

pub use course::{Course, CourseError, Lesson, sort_lessons};
pub use enrollment::{Enrollment, EnrollmentStatus};
pub use notification::{NewNotification, Notification, NotificationKind, UnknownKind};
pub use progress::{
    CourseProgress, LessonProgress, LessonProgressEntry, ProgressSnapshot, rounded_percentage,
};
pub use quiz::{
    AnswerOption, AnswerSheet, ParseOptionError, Question, Quiz, QuizDefinitionError, QuizResult,
};
