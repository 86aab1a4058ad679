//! Pure scoring of a quiz attempt against its answer key.

use serde::{Deserialize, Serialize};

use crate::model::progress::rounded_percentage;
use crate::model::{AnswerOption, AnswerSheet, Quiz};

/// Outcome of grading one answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub correct_count: u32,
    pub total_questions: u32,
    pub score: u32,
    pub passed: bool,
}

/// Score `answers` against `quiz`.
///
/// Each question counts once. A missing answer, an answer that is not one of
/// `A`..`D`, or an answer for a question the quiz does not have never matches.
/// A quiz without questions scores `0`.
///
/// ```
/// # use course_core::grading::grade;
/// # use course_core::model::{AnswerOption, AnswerSheet, LessonId, Question, QuestionId, Quiz, QuizId};
/// let quiz = Quiz::new(
///     QuizId::new(1),
///     LessonId::new(1),
///     "Q",
///     50,
///     None,
///     vec![Question::new(QuestionId::new(1), AnswerOption::C, 0)],
/// )
/// .unwrap();
/// let mut answers = AnswerSheet::new();
/// answers.insert(QuestionId::new(1), "c".into());
/// assert_eq!(grade(&quiz, &answers).score, 100);
/// ```
#[must_use]
pub fn grade(quiz: &Quiz, answers: &AnswerSheet) -> Grade {
    let total = quiz.questions().len();
    let correct = quiz
        .questions()
        .iter()
        .filter(|q| {
            answers
                .get(&q.id)
                .and_then(|raw| raw.parse::<AnswerOption>().ok())
                .is_some_and(|picked| picked == q.correct_option)
        })
        .count();

    let total_questions = u32::try_from(total).unwrap_or(u32::MAX);
    let correct_count = u32::try_from(correct).unwrap_or(u32::MAX);
    let score = rounded_percentage(correct_count, total_questions);

    Grade {
        correct_count,
        total_questions,
        score,
        passed: score >= quiz.passing_score(),
    }
}
