use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::course::Lesson;
use crate::model::ids::{LessonId, StudentId};

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// Completion fact for one (student, lesson) pair.
///
/// At most one exists per pair. `completed` only moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    /// A fresh, completed row as written by the first completion event.
    #[must_use]
    pub fn completed(student_id: StudentId, lesson_id: LessonId, at: DateTime<Utc>) -> Self {
        Self {
            student_id,
            lesson_id,
            completed: true,
            completed_at: Some(at),
        }
    }

    /// Re-applies a completion event. The timestamp is last-write-wins.
    pub fn mark_complete(&mut self, at: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(at);
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregate lesson counts for a (student, course) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub total_lessons: u32,
    pub completed_lessons: u32,
    pub percentage: u32,
}

impl CourseProgress {
    /// Derive the percentage from raw counts.
    ///
    /// Rounds half up, and reports `0` for a course without lessons.
    ///
    /// ```
    /// # use course_core::model::CourseProgress;
    /// assert_eq!(CourseProgress::from_counts(4, 1).percentage, 25);
    /// assert_eq!(CourseProgress::from_counts(0, 0).percentage, 0);
    /// ```
    #[must_use]
    pub fn from_counts(total_lessons: u32, completed_lessons: u32) -> Self {
        let completed_lessons = completed_lessons.min(total_lessons);
        Self {
            total_lessons,
            completed_lessons,
            percentage: rounded_percentage(completed_lessons, total_lessons),
        }
    }

    /// True when every lesson is done and there is at least one lesson.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_lessons > 0 && self.completed_lessons == self.total_lessons
    }
}

/// `round(100 * part / whole)` with half-up rounding, `0` when `whole == 0`.
#[must_use]
pub fn rounded_percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part);
    let whole = u64::from(whole);
    let pct = (200 * part + whole) / (2 * whole);
    u32::try_from(pct).unwrap_or(u32::MAX)
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Per-lesson row of a progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressEntry {
    pub id: LessonId,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Progress of one student through one course, lesson by lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub progress: CourseProgress,
    pub per_lesson: Vec<LessonProgressEntry>,
}

impl ProgressSnapshot {
    /// Join ordered lessons with whatever progress rows exist for them.
    ///
    /// Rows for lessons outside `lessons` are ignored.
    #[must_use]
    pub fn build(lessons: &[Lesson], rows: &[LessonProgress]) -> Self {
        let per_lesson: Vec<LessonProgressEntry> = lessons
            .iter()
            .map(|lesson| {
                let row = rows.iter().find(|r| r.lesson_id == lesson.id());
                LessonProgressEntry {
                    id: lesson.id(),
                    title: lesson.title().to_owned(),
                    completed: row.is_some_and(|r| r.completed),
                    completed_at: row.and_then(|r| r.completed_at),
                }
            })
            .collect();

        let total = u32::try_from(per_lesson.len()).unwrap_or(u32::MAX);
        let done = u32::try_from(per_lesson.iter().filter(|e| e.completed).count())
            .unwrap_or(u32::MAX);

        Self {
            progress: CourseProgress::from_counts(total, done),
            per_lesson,
        }
    }
}
