use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId, QuizId, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizDefinitionError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("passing score must be within 0..=100, got {0}")]
    InvalidPassingScore(u32),

    #[error("max attempts must be at least 1 when set")]
    InvalidMaxAttempts,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("not an answer option: {0:?}")]
pub struct ParseOptionError(String);

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// One of the four multiple-choice letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerOption::A => "A",
            AnswerOption::B => "B",
            AnswerOption::C => "C",
            AnswerOption::D => "D",
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerOption {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(AnswerOption::A),
            "B" | "b" => Ok(AnswerOption::B),
            "C" | "c" => Ok(AnswerOption::C),
            "D" | "d" => Ok(AnswerOption::D),
            _ => Err(ParseOptionError(s.to_owned())),
        }
    }
}

/// Raw answers as submitted: question id to the selected letter.
///
/// Values are kept verbatim so that an unparseable selection is stored as sent
/// and simply graded as incorrect.
pub type AnswerSheet = BTreeMap<QuestionId, String>;

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub correct_option: AnswerOption,
    pub order: u32,
}

impl Question {
    #[must_use]
    pub fn new(id: QuestionId, correct_option: AnswerOption, order: u32) -> Self {
        Self {
            id,
            correct_option,
            order,
        }
    }
}

/// A multiple-choice quiz attached to a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    id: QuizId,
    lesson_id: LessonId,
    title: String,
    passing_score: u32,
    max_attempts: Option<u32>,
    questions: Vec<Question>,
}

impl Quiz {
    /// Build a quiz, ordering its questions by `order` (then id).
    ///
    /// # Errors
    ///
    /// Returns `QuizDefinitionError` for an empty title, a passing score above
    /// 100, `Some(0)` max attempts, or repeated question ids.
    pub fn new(
        id: QuizId,
        lesson_id: LessonId,
        title: impl Into<String>,
        passing_score: u32,
        max_attempts: Option<u32>,
        mut questions: Vec<Question>,
    ) -> Result<Self, QuizDefinitionError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(QuizDefinitionError::EmptyTitle);
        }
        if passing_score > 100 {
            return Err(QuizDefinitionError::InvalidPassingScore(passing_score));
        }
        if max_attempts == Some(0) {
            return Err(QuizDefinitionError::InvalidMaxAttempts);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id) {
                return Err(QuizDefinitionError::DuplicateQuestion(q.id));
            }
        }
        questions.sort_by_key(|q| (q.order, q.id));

        Ok(Self {
            id,
            lesson_id,
            title,
            passing_score,
            max_attempts,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn passing_score(&self) -> u32 {
        self.passing_score
    }

    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// One persisted quiz attempt. Attempts are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: i64,
    pub student_id: StudentId,
    pub quiz_id: QuizId,
    pub score: u32,
    pub answers: AnswerSheet,
    pub completed_at: DateTime<Utc>,
}
